use crate::audit::AuditPublisher;
use crate::service::MetricsService;
use rsa::RsaPrivateKey;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MetricsService>,
    pub audit: Arc<AuditPublisher>,
    pub signing_key: Option<Arc<String>>,
    pub private_key: Option<Arc<RsaPrivateKey>>,
}
