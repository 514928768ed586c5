mod otlp;
mod queue;

pub use otlp::{API_REQUEST_BODY, decode_log_batch};
pub use queue::{QUEUE_CAPACITY, RecordQueue, record_queue};
