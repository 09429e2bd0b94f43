use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use leadgate::config::{AppConfig, StoreBackend};
use leadgate::error::AppError;
use leadgate::stores::{
    InMemoryCounterStore, InMemoryDecisionLedger, InMemoryPerformanceSource, InMemoryRuleStore,
    RestCounterStore, RestPerformanceSource, RestRuleStore,
};
use leadgate::workflows::admin::AdminState;
use leadgate::workflows::admission::{
    AdmissionEngine, CounterStore, DecisionLedger, HttpPostbackForwarder, PostbackGateway,
    RuleStore,
};
use leadgate::workflows::autopilot::{AutoPilotController, CounterSync, PerformanceSource};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type Engine = AdmissionEngine<dyn RuleStore, dyn CounterStore, dyn PostbackGateway>;
pub(crate) type Controller =
    AutoPilotController<dyn RuleStore, dyn CounterStore, dyn PerformanceSource>;
pub(crate) type HistorySync = CounterSync<dyn CounterStore, dyn PerformanceSource>;

/// Every collaborator the service talks to, selected once from configuration.
#[derive(Clone)]
pub(crate) struct Collaborators {
    pub(crate) rules: Arc<dyn RuleStore>,
    pub(crate) counters: Arc<dyn CounterStore>,
    pub(crate) performance: Arc<dyn PerformanceSource>,
    pub(crate) postback: Arc<dyn PostbackGateway>,
    pub(crate) ledger: Option<Arc<dyn DecisionLedger>>,
}

impl Collaborators {
    pub(crate) fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let postback: Arc<dyn PostbackGateway> =
            Arc::new(HttpPostbackForwarder::new(&config.postback)?);

        match &config.stores {
            StoreBackend::InMemory => Ok(Self::in_memory(postback)),
            StoreBackend::Rest(rest) => Ok(Self {
                rules: Arc::new(RestRuleStore::new(rest)?),
                counters: Arc::new(RestCounterStore::new(rest)?),
                performance: Arc::new(RestPerformanceSource::new(rest)?),
                postback,
                ledger: None,
            }),
        }
    }

    pub(crate) fn in_memory(postback: Arc<dyn PostbackGateway>) -> Self {
        Self {
            rules: Arc::new(InMemoryRuleStore::default()),
            counters: Arc::new(InMemoryCounterStore::default()),
            performance: Arc::new(InMemoryPerformanceSource::default()),
            postback,
            ledger: Some(Arc::new(InMemoryDecisionLedger::default())),
        }
    }

    pub(crate) fn engine(&self, config: &AppConfig) -> Engine {
        let engine = AdmissionEngine::new(
            self.rules.clone(),
            self.counters.clone(),
            self.postback.clone(),
            config.admission.clone(),
        );
        match &self.ledger {
            Some(ledger) => engine.with_ledger(ledger.clone()),
            None => engine,
        }
    }

    pub(crate) fn controller(&self, config: &AppConfig) -> Controller {
        AutoPilotController::new(
            self.rules.clone(),
            self.counters.clone(),
            self.performance.clone(),
            config.autopilot.clone(),
        )
    }

    pub(crate) fn history_sync(&self) -> HistorySync {
        CounterSync::new(self.counters.clone(), self.performance.clone())
    }

    pub(crate) fn admin_state(&self, config: &AppConfig) -> AdminState {
        AdminState::new(
            self.rules.clone(),
            self.counters.clone(),
            self.performance.clone(),
            &config.admin,
        )
    }
}
