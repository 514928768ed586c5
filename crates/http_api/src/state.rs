use std::sync::Arc;

use ingest::RecordQueue;
use monitor_app::UsageRepository;

#[derive(Clone)]
pub struct HttpState {
    pub repository: Arc<dyn UsageRepository>,
    pub intake: RecordQueue,
}

impl HttpState {
    pub fn new(repository: Arc<dyn UsageRepository>, intake: RecordQueue) -> Self {
        Self { repository, intake }
    }
}
