//! In-process cluster runner
//!
//! Starts a set of participants on one shared ensemble. Each participant owns
//! a session with its own dispatcher task, an elector, a registry and the
//! election actions tying them together, just as separate processes would.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use succession_common::{CoordinationError, Result, node_name, service_address};
use succession_consistency::{LeaderElector, rank_candidates};
use succession_coordination::{CoordinationClient, MemoryEnsemble, MemorySession};
use succession_naming::{AddressView, ServiceRegistry};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{info, warn};

use super::connection_watcher::ConnectionWatcher;
use super::election_action::ElectionAction;
use super::target_watcher::TargetWatcher;
use crate::startup::{ShutdownSignal, run_with_shutdown};

/// Settings for [`Cluster::start`].
#[derive(Debug, Clone)]
pub struct ClusterSettings {
    pub size: usize,
    pub election_namespace: String,
    pub registry_namespace: String,
    pub scheme: String,
    pub host: String,
    /// Participant `i` publishes `base_port + i`
    pub base_port: u16,
    pub report_interval: Duration,
    /// Expire the current leader this often; `None` disables failover
    pub failover_interval: Option<Duration>,
    pub target_path: Option<String>,
}

impl ClusterSettings {
    /// Port published by participant `index`, if it fits in a `u16`.
    pub fn port_of(&self, index: usize) -> Option<u16> {
        u16::try_from(index)
            .ok()
            .and_then(|offset| self.base_port.checked_add(offset))
    }

    /// Reject settings that would reuse ports or stall the run loop.
    pub fn validate(&self) -> Result<()> {
        if self.size > 0 && self.port_of(self.size - 1).is_none() {
            return Err(CoordinationError::BadArguments(format!(
                "{} participants starting at port {} exceed the port range",
                self.size, self.base_port
            )));
        }
        if self.report_interval.is_zero() {
            return Err(CoordinationError::BadArguments(
                "report interval must be positive".to_string(),
            ));
        }
        if self.failover_interval.is_some_and(|period| period.is_zero()) {
            return Err(CoordinationError::BadArguments(
                "failover interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// One member of the cluster.
pub struct Participant {
    name: String,
    address: String,
    session: Arc<MemorySession>,
    elector: Arc<LeaderElector>,
    registry: Arc<ServiceRegistry>,
    target: Option<Arc<TargetWatcher>>,
    shutdown: ShutdownSignal,
    dispatcher: JoinHandle<()>,
}

impl Participant {
    /// Connect, volunteer, and run the first election round.
    pub async fn join(
        ensemble: &MemoryEnsemble,
        settings: &ClusterSettings,
        index: usize,
    ) -> Result<Self> {
        let name = format!("participant-{}", index + 1);
        let port = settings.port_of(index).ok_or_else(|| {
            CoordinationError::BadArguments(format!("no port left for {}", name))
        })?;
        let address = service_address(&settings.scheme, &settings.host, port);

        let shutdown = ShutdownSignal::new();
        let connection_watcher = Arc::new(ConnectionWatcher::new(name.clone(), shutdown.clone()));
        let (session, dispatcher) = ensemble.connect(connection_watcher);
        let dispatcher = tokio::spawn(dispatcher.run());

        let registry =
            ServiceRegistry::with_namespace(session.clone(), settings.registry_namespace.clone());
        registry.ensure_registry_namespace().await?;

        let action = Arc::new(ElectionAction::new(registry.clone(), address.clone()));
        let elector = LeaderElector::with_namespace(
            session.clone(),
            action,
            settings.election_namespace.clone(),
        );
        elector.ensure_namespace().await?;
        elector.volunteer().await?;
        elector.elect_leader().await?;

        let target = match &settings.target_path {
            Some(path) => {
                let target = TargetWatcher::new(session.clone(), path.clone());
                target.watch().await?;
                Some(target)
            }
            None => None,
        };

        info!(
            "Participant joined: name={}, address={}, session={}",
            name,
            address,
            session.session_id()
        );

        Ok(Self {
            name,
            address,
            session,
            elector,
            registry,
            target,
            shutdown,
            dispatcher,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn session_id(&self) -> u64 {
        self.session.session_id()
    }

    pub fn elector(&self) -> &Arc<LeaderElector> {
        &self.elector
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn target(&self) -> Option<&Arc<TargetWatcher>> {
        self.target.as_ref()
    }

    /// Fires once the participant's session is gone.
    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    pub fn is_connected(&self) -> bool {
        !self.shutdown.is_shutdown()
    }
}

/// A set of participants sharing one ensemble.
pub struct Cluster {
    ensemble: MemoryEnsemble,
    settings: ClusterSettings,
    participants: Vec<Participant>,
}

impl Cluster {
    /// Start `settings.size` participants one after another on a fresh ensemble.
    pub async fn start(settings: ClusterSettings) -> Result<Self> {
        Self::start_on(MemoryEnsemble::new(), settings).await
    }

    /// Like [`Cluster::start`], but gives up once `shutdown` fires.
    ///
    /// Returns `None` when interrupted. The half-started ensemble is dropped,
    /// which ends the sessions of participants that already joined.
    pub async fn start_with_shutdown(
        settings: ClusterSettings,
        shutdown: &ShutdownSignal,
    ) -> Result<Option<Self>> {
        match run_with_shutdown(Self::start(settings), shutdown).await {
            Some(cluster) => cluster.map(Some),
            None => {
                info!("Cluster start interrupted by shutdown");
                Ok(None)
            }
        }
    }

    pub async fn start_on(ensemble: MemoryEnsemble, settings: ClusterSettings) -> Result<Self> {
        settings.validate()?;

        let mut participants = Vec::with_capacity(settings.size);
        for index in 0..settings.size {
            participants.push(Participant::join(&ensemble, &settings, index).await?);
        }

        info!(
            "Cluster started: participants={}, election={}, registry={}",
            participants.len(),
            settings.election_namespace,
            settings.registry_namespace
        );
        crate::metrics::set_cluster_participants(participants.len());

        Ok(Self {
            ensemble,
            settings,
            participants,
        })
    }

    pub fn ensemble(&self) -> &MemoryEnsemble {
        &self.ensemble
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn connected(&self) -> usize {
        self.participants.iter().filter(|p| p.is_connected()).count()
    }

    /// The participant owning the lowest-sequence election node.
    pub fn leader(&self) -> Option<&Participant> {
        let ranked = rank_candidates(self.ensemble.children_of(&self.settings.election_namespace));
        let first = ranked.first()?;
        self.participants.iter().find(|p| {
            p.elector
                .candidate()
                .is_some_and(|candidate| node_name(&candidate) == first.name)
        })
    }

    /// Expire the current leader's session. Returns the expired participant's name.
    pub fn fail_leader(&self) -> Option<String> {
        let leader = self.leader()?;
        if !self.ensemble.expire(leader.session_id()) {
            return None;
        }
        warn!("Expired leader session: participant={}", leader.name);
        Some(leader.name.clone())
    }

    /// The leader's current address view.
    pub async fn leader_view(&self) -> Option<Arc<AddressView>> {
        let leader = self.leader()?;
        match leader.registry.get_all_service_addresses().await {
            Ok(view) => Some(view),
            Err(e) => {
                warn!(
                    "Failed to read leader view: participant={}, error={}",
                    leader.name, e
                );
                None
            }
        }
    }

    /// Log the current leader and the workers it sees.
    pub async fn report(&self) {
        let connected = self.connected();
        crate::metrics::set_cluster_participants(connected);

        let Some(leader) = self.leader() else {
            info!("No leader elected: connected={}", connected);
            return;
        };

        match self.leader_view().await {
            Some(view) => info!(
                "Cluster status: leader={}, connected={}, view_version={}, workers={:?}",
                leader.name,
                connected,
                view.version(),
                view.addresses()
            ),
            None => info!(
                "Cluster status: leader={}, connected={}",
                leader.name, connected
            ),
        }
    }

    /// Report periodically, and expire the leader on the failover interval if
    /// set, until `shutdown` fires or every participant has disconnected.
    pub async fn run(&self, shutdown: &ShutdownSignal) {
        let mut report = interval_at(
            Instant::now() + self.settings.report_interval,
            self.settings.report_interval,
        );
        let mut failover = self
            .settings
            .failover_interval
            .map(|period| interval_at(Instant::now() + period, period));

        let all_disconnected = join_all(self.participants.iter().map(|p| p.shutdown.wait()));
        tokio::pin!(all_disconnected);

        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!("Shutdown requested, stopping cluster");
                    break;
                }
                _ = &mut all_disconnected => {
                    info!("All participants disconnected, stopping cluster");
                    break;
                }
                _ = report.tick() => {
                    self.report().await;
                }
                _ = async {
                    match failover.as_mut() {
                        Some(timer) => {
                            timer.tick().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    if let Some(name) = self.fail_leader() {
                        info!("Failover triggered: expired={}", name);
                    }
                }
            }
        }
    }

    /// Close every remaining session and wait for the dispatchers to drain.
    pub async fn stop(self) {
        for participant in &self.participants {
            participant.session.close();
        }
        for participant in self.participants {
            if let Err(e) = participant.dispatcher.await {
                warn!(
                    "Dispatcher task failed: participant={}, error={}",
                    participant.name, e
                );
            }
        }
        crate::metrics::set_cluster_participants(0);
        info!("Cluster stopped");
    }
}
