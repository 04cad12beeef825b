//! Service assembly and lifecycle.
//!
//! [`Orchestrator`] wires the components together, owns the background
//! loops, and tears them down in order on [`Orchestrator::shutdown`].

use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

use crate::admission::{self, RateLimiter};
use crate::classifier::{IntentClassifier, RemoteClassifier};
use crate::config::GlobalConfig;
use crate::conversation::{self, ConversationStore};
use crate::dispatch::{AppState, Dispatcher};
use crate::driver::Executor;
use crate::identity::{MemberResolver, StaticMemberResolver};
use crate::orchestrator::{self, ManagerSettings, TaskLifecycleManager};
use crate::policy::{KeywordPolicy, TaskPolicy};
use crate::store::HistoryStore;
use crate::transport::{console, Messenger};

/// External collaborators the service talks to.
pub struct Collaborators {
    /// Outbound transport.
    pub messenger: Arc<dyn Messenger>,
    /// Execution engine.
    pub executor: Arc<dyn Executor>,
    /// Remote intent classifier; `None` uses local rules only.
    pub remote: Option<Arc<dyn RemoteClassifier>>,
    /// Execution history store.
    pub history: Option<Arc<dyn HistoryStore>>,
}

/// The running orchestration service.
pub struct Orchestrator {
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
    loops: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    /// Build every component from configuration. Nothing runs until
    /// [`start`](Self::start).
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>, parts: Collaborators) -> Self {
        let cancel = CancellationToken::new();
        let policy: Arc<dyn TaskPolicy> = Arc::new(KeywordPolicy);
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let conversations = Arc::new(ConversationStore::new(
            config.classifier.max_history,
            config.classifier.history_ttl(),
        ));
        let classifier = Arc::new(IntentClassifier::new(
            Arc::clone(&policy),
            parts.remote,
            config.classifier.timeout(),
        ));
        let members: Option<Arc<dyn MemberResolver>> = if config.members.is_empty() {
            None
        } else {
            Some(Arc::new(StaticMemberResolver::new(config.members.clone())))
        };
        let tasks = Arc::new(TaskLifecycleManager::new(
            ManagerSettings::from_config(&config),
            Arc::clone(&limiter),
            Arc::clone(&parts.executor),
            Arc::clone(&parts.messenger),
            policy,
            parts.history.clone(),
            members,
            cancel.clone(),
        ));

        let state = Arc::new(AppState {
            config,
            limiter,
            conversations,
            classifier,
            tasks,
            executor: parts.executor,
            messenger: parts.messenger,
            history: parts.history,
        });
        let dispatcher = Arc::new(Dispatcher::new(state, cancel.clone()));

        Self {
            dispatcher,
            cancel,
            loops: Vec::new(),
        }
    }

    /// Inbound entry point, for transports that push messages themselves.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Token cancelled by [`shutdown`](Self::shutdown) or at end of intake input.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start the expiry, history and limiter sweeps.
    pub fn start(&mut self) {
        let state = self.dispatcher.state();
        self.loops.push(orchestrator::spawn_expiry_task(
            Arc::clone(&state.tasks),
            state.config.tasks.sweep_interval(),
            self.cancel.clone(),
        ));
        self.loops.push(conversation::spawn_sweep_task(
            Arc::clone(&state.conversations),
            conversation::SWEEP_INTERVAL,
            self.cancel.clone(),
        ));
        self.loops.push(admission::spawn_cleanup_task(
            Arc::clone(&state.limiter),
            admission::CLEANUP_INTERVAL,
            admission::BUCKET_MAX_AGE,
            self.cancel.clone(),
        ));
        info!(
            remote_classifier = state.classifier.has_remote(),
            rate_limit = state.limiter.is_enabled(),
            "orchestrator started"
        );
    }

    /// Read line-oriented messages from `input` until shutdown.
    ///
    /// End of input stops the whole service.
    pub fn start_intake<R>(&mut self, input: R)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let dispatcher = Arc::clone(&self.dispatcher);
        let cancel = self.cancel.clone();
        self.loops.push(tokio::spawn(async move {
            console::run_intake(input, dispatcher, cancel.clone()).await;
            cancel.cancel();
        }));
    }

    /// Stop every loop and execution, returning once all have exited.
    pub async fn shutdown(self) {
        let span = info_span!("orchestrator_shutdown");
        async move {
            self.cancel.cancel();
            for handle in self.loops {
                if let Err(err) = handle.await {
                    tracing::warn!(%err, "background loop ended abnormally");
                }
            }
            self.dispatcher.state().tasks.shutdown().await;
            info!("orchestrator shut down");
        }
        .instrument(span)
        .await;
    }
}
