/// Progress reporting for long-running operations (fetch loop, build).
/// Frontends implement this to surface status to users.
pub trait Progress {
    /// Called at the start with the number of items to process.
    fn begin(&mut self, _total: usize) {}

    /// Free-form status line.
    fn log(&mut self, _msg: &str) {}

    /// One item (a player, a source file) finished with the given status.
    fn item_done(&mut self, _item: &str, _status: &str) {}

    fn finish(&mut self) {}
}

/// A no-op progress sink.
pub struct NullProgress;
impl Progress for NullProgress {}
