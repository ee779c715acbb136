//! Coverage trace emitter
//!
//! Prints `COV: <id>` the first time a point is observed, provided the
//! allow-list lets it through. The filter file is read lazily, once, on the
//! first observation.

use eyre::{Result, eyre};
use std::collections::HashSet;
use std::io::{Stdout, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;

use crate::filter::{DEFAULT_FILTER_FILE, Filter};

/// Prefix of every emitted line
pub const LINE_PREFIX: &str = "COV: ";

struct State<W> {
    filter_path: PathBuf,
    /// `None` until the filter file has been consulted
    filter: Option<Filter>,
    seen: HashSet<String>,
    sink: W,
}

/// Emits each allowed point at most once to its sink
pub struct Emitter<W: Write + Send> {
    state: Mutex<State<W>>,
}

impl<W: Write + Send> Emitter<W> {
    /// Create an emitter reading its filter from `filter_path` on first use
    pub fn new<P: Into<PathBuf>>(filter_path: P, sink: W) -> Self {
        Self {
            state: Mutex::new(State {
                filter_path: filter_path.into(),
                filter: None,
                seen: HashSet::new(),
                sink,
            }),
        }
    }

    /// Record that point `id` was reached and hand `condition` back unchanged
    pub fn observe(&self, id: &str, condition: bool) -> bool {
        let mut state = self.lock();

        if state.filter.is_none() {
            let filter = Filter::load(&state.filter_path);
            state.filter = Some(filter);
        }

        let allowed = state.filter.as_ref().is_some_and(|f| f.allows(id));
        if allowed && !state.seen.contains(id) {
            let line = format!("{}{}\n", LINE_PREFIX, id);
            if let Err(e) = state.sink.write_all(line.as_bytes()).and_then(|_| state.sink.flush()) {
                log::trace!("Dropped trace line for {:?}: {}", id, e);
            }
            state.seen.insert(id.to_string());
        }

        condition
    }

    /// Integer form of [`Emitter::observe`]: only `1` counts as true
    pub fn observe_int(&self, id: &str, condition: i32) -> i32 {
        i32::from(self.observe(id, condition == 1))
    }

    /// Points emitted so far, sorted
    pub fn emitted(&self) -> Vec<String> {
        let mut points: Vec<String> = self.lock().seen.iter().cloned().collect();
        points.sort();
        points
    }

    pub fn filter_loaded(&self) -> bool {
        self.lock().filter.is_some()
    }

    pub fn filter_path(&self) -> PathBuf {
        self.lock().filter_path.clone()
    }

    /// Point the emitter at another filter file
    ///
    /// Only possible before the first observation has loaded the filter.
    pub fn set_filter_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut state = self.lock();
        if state.filter.is_some() {
            return Err(eyre!(
                "Filter already loaded from {}, cannot switch to {}",
                state.filter_path.display(),
                path.as_ref().display()
            ));
        }
        state.filter_path = path.as_ref().to_path_buf();
        Ok(())
    }

    /// Forget emitted points and reload the filter on the next observation
    pub fn reset(&self) {
        let mut state = self.lock();
        state.filter = None;
        state.seen.clear();
    }

    pub fn into_sink(self) -> W {
        let state = self.state.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.sink
    }

    // A panicking sink must not switch tracing off for the rest of the process
    fn lock(&self) -> MutexGuard<'_, State<W>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

static GLOBAL: Lazy<Emitter<Stdout>> = Lazy::new(|| Emitter::new(DEFAULT_FILTER_FILE, std::io::stdout()));

/// The process-wide emitter writing to standard output
pub fn global() -> &'static Emitter<Stdout> {
    &GLOBAL
}

/// Observe `id` on the process-wide emitter
pub fn observe(id: &str, condition: bool) -> bool {
    GLOBAL.observe(id, condition)
}

/// Observe `id` on the process-wide emitter, `1` meaning true
pub fn observe_int(id: &str, condition: i32) -> i32 {
    GLOBAL.observe_int(id, condition)
}

/// Observe `id`, then abort: the point must never execute
pub fn observe_assert(id: &str) -> ! {
    observe(id, true);
    unreachable_point(id)
}

/// Abort the process because the point `id` was reached
pub fn unreachable_point(id: &str) -> ! {
    log::error!("Unreachable coverage point reached: {}", id);
    eprintln!("covtrace: unreachable coverage point reached: {}", id);
    std::process::abort()
}

/// Change the filter file of the process-wide emitter before it is loaded
pub fn set_filter_path<P: AsRef<Path>>(path: P) -> Result<()> {
    GLOBAL.set_filter_path(path)
}

/// Clear the process-wide emitter's state
pub fn reset() {
    GLOBAL.reset()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    /// Sink shared between the emitter and the test
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    fn emitter_with_filter(temp: &TempDir, filter: Option<&str>) -> (Emitter<SharedBuffer>, SharedBuffer) {
        let path = temp.path().join("covfilter.txt");
        if let Some(content) = filter {
            fs::write(&path, content).unwrap();
        }
        let buffer = SharedBuffer::default();
        (Emitter::new(path, buffer.clone()), buffer)
    }

    #[test]
    fn test_no_filter_emits_each_point_once() {
        let temp = TempDir::new().unwrap();
        let (emitter, out) = emitter_with_filter(&temp, None);

        emitter.observe("a", true);
        emitter.observe("b", true);
        emitter.observe("a", true);

        assert_eq!(out.contents(), "COV: a\nCOV: b\n");
    }

    #[test]
    fn test_filter_restricts_points() {
        let temp = TempDir::new().unwrap();
        let (emitter, out) = emitter_with_filter(&temp, Some("a c"));

        for id in ["a", "b", "c", "a"] {
            emitter.observe(id, true);
        }

        assert_eq!(out.contents(), "COV: a\nCOV: c\n");
    }

    #[test]
    fn test_empty_filter_file() {
        let temp = TempDir::new().unwrap();
        let (emitter, out) = emitter_with_filter(&temp, Some(""));

        emitter.observe("x", true);
        emitter.observe("x", true);

        assert_eq!(out.contents(), "COV: x\n");
    }

    #[test]
    fn test_condition_passes_through() {
        let temp = TempDir::new().unwrap();
        let (emitter, out) = emitter_with_filter(&temp, Some("p"));

        assert!(!emitter.observe("p", false));
        assert!(emitter.observe("p", true));
        assert!(!emitter.observe("filtered", false));
        assert!(emitter.observe("filtered", true));

        assert_eq!(out.contents(), "COV: p\n");
    }

    #[test]
    fn test_integer_form_mirrors_condition() {
        let temp = TempDir::new().unwrap();
        let (emitter, out) = emitter_with_filter(&temp, None);

        assert_eq!(emitter.observe_int("one", 1), 1);
        assert_eq!(emitter.observe_int("zero", 0), 0);
        // only exactly 1 is truthy
        assert_eq!(emitter.observe_int("two", 2), 0);
        assert_eq!(emitter.observe_int("negative", -1), 0);

        assert_eq!(out.contents(), "COV: one\nCOV: zero\nCOV: two\nCOV: negative\n");
    }

    #[test]
    fn test_empty_identifier_is_a_point() {
        let temp = TempDir::new().unwrap();
        let (emitter, out) = emitter_with_filter(&temp, None);

        emitter.observe("", true);
        emitter.observe("", true);

        assert_eq!(out.contents(), "COV: \n");
    }

    #[test]
    fn test_empty_identifier_filtered_out() {
        let temp = TempDir::new().unwrap();
        let (emitter, out) = emitter_with_filter(&temp, Some("a"));

        emitter.observe("", true);

        assert_eq!(out.contents(), "");
    }

    #[test]
    fn test_filter_read_once() {
        let temp = TempDir::new().unwrap();
        let (emitter, out) = emitter_with_filter(&temp, Some("a"));

        assert!(!emitter.filter_loaded());
        emitter.observe("a", true);
        assert!(emitter.filter_loaded());

        // Changes on disk are ignored after the first observation
        fs::write(temp.path().join("covfilter.txt"), "b").unwrap();
        emitter.observe("b", true);

        assert_eq!(out.contents(), "COV: a\n");
    }

    #[test]
    fn test_filter_file_removed_after_load() {
        let temp = TempDir::new().unwrap();
        let (emitter, out) = emitter_with_filter(&temp, Some("a"));

        emitter.observe("a", true);
        fs::remove_file(temp.path().join("covfilter.txt")).unwrap();
        emitter.observe("b", true);

        assert_eq!(out.contents(), "COV: a\n");
    }

    #[test]
    fn test_reset_reloads_filter() {
        let temp = TempDir::new().unwrap();
        let (emitter, out) = emitter_with_filter(&temp, Some("a"));

        emitter.observe("a", true);
        fs::write(temp.path().join("covfilter.txt"), "b").unwrap();
        emitter.reset();
        assert!(!emitter.filter_loaded());
        assert!(emitter.emitted().is_empty());

        emitter.observe("a", true);
        emitter.observe("b", true);

        assert_eq!(out.contents(), "COV: a\nCOV: b\n");
    }

    #[test]
    fn test_set_filter_path_before_load() {
        let temp = TempDir::new().unwrap();
        let other = temp.path().join("other.txt");
        fs::write(&other, "only").unwrap();
        let (emitter, out) = emitter_with_filter(&temp, Some("a"));

        emitter.set_filter_path(&other).unwrap();
        assert_eq!(emitter.filter_path(), other);
        emitter.observe("a", true);
        emitter.observe("only", true);

        assert_eq!(out.contents(), "COV: only\n");
    }

    #[test]
    fn test_set_filter_path_after_load_fails() {
        let temp = TempDir::new().unwrap();
        let (emitter, _out) = emitter_with_filter(&temp, None);

        emitter.observe("a", true);
        let result = emitter.set_filter_path(temp.path().join("late.txt"));

        assert!(result.is_err());
        assert_eq!(emitter.filter_path(), temp.path().join("covfilter.txt"));
    }

    #[test]
    fn test_emitted_snapshot() {
        let temp = TempDir::new().unwrap();
        let (emitter, _out) = emitter_with_filter(&temp, Some("b a"));

        emitter.observe("b", true);
        emitter.observe("z", true);
        emitter.observe("a", true);

        assert_eq!(emitter.emitted(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_broken_sink_is_tolerated() {
        let temp = TempDir::new().unwrap();
        let emitter = Emitter::new(temp.path().join("covfilter.txt"), BrokenSink);

        assert!(emitter.observe("a", true));
        assert!(!emitter.observe("b", false));
        assert_eq!(emitter.emitted(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_into_sink() {
        let temp = TempDir::new().unwrap();
        let emitter = Emitter::new(temp.path().join("covfilter.txt"), Vec::new());

        emitter.observe("a", true);

        assert_eq!(emitter.into_sink(), b"COV: a\n".to_vec());
    }

    #[test]
    fn test_two_threads_race_on_one_point() {
        let temp = TempDir::new().unwrap();
        let (emitter, out) = emitter_with_filter(&temp, None);
        let emitter = Arc::new(emitter);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let emitter = Arc::clone(&emitter);
                thread::spawn(move || (0..1000).all(|_| emitter.observe("race", true)))
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(out.contents(), "COV: race\n");
    }

    #[test]
    fn test_many_threads_distinct_points() {
        let temp = TempDir::new().unwrap();
        let (emitter, out) = emitter_with_filter(&temp, None);
        let emitter = Arc::new(emitter);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let emitter = Arc::clone(&emitter);
                thread::spawn(move || {
                    for i in 0..50 {
                        // every thread hits the shared points and its own
                        emitter.observe(&format!("shared-{}", i), false);
                        emitter.observe(&format!("thread-{}-{}", t, i), true);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let contents = out.contents();
        let mut lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 50 + 8 * 50);
        assert!(lines.iter().all(|l| l.starts_with(LINE_PREFIX)));
        lines.sort();
        lines.dedup();
        assert_eq!(lines.len(), 50 + 8 * 50);
    }

    #[test]
    fn test_concurrent_first_load() {
        let temp = TempDir::new().unwrap();
        let (emitter, out) = emitter_with_filter(&temp, Some("a"));
        let emitter = Arc::new(emitter);

        let handles: Vec<_> = ["a", "b", "a", "b"]
            .into_iter()
            .map(|id| {
                let emitter = Arc::clone(&emitter);
                thread::spawn(move || emitter.observe(id, true))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }

        assert_eq!(out.contents(), "COV: a\n");
    }
}
