mod reconciler;
mod status;
mod work_queue;

pub use reconciler::ReconcilerService;
pub use status::StatusPatcherService;
pub use work_queue::WorkQueue;
