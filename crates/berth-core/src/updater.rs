use crate::config::MirrorConfig;
use crate::lifecycle::{validate_transition, UpdateStep};
use crate::progress::{ProgressLog, SPINNER_FRAMES};
use crate::sanitize::sanitize_for_recreate;
use crate::UpdateError;
use berth_runtime::{EngineGateway, RuntimeError};
use berth_schema::{Container, ContainerId, PullProgress};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Snapshot of an update in flight: the current step and the whole log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateProgress {
    pub step: UpdateStep,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub new_container_id: ContainerId,
    pub lines: Vec<String>,
}

/// Replaces a container with one created from a freshly pulled image.
///
/// One orchestrator serves one invocation: `run` consumes it. The sequence is
/// pull, capture configuration, stop, remove, recreate, start. The first
/// failing step ends the run with no rollback, so a failure after the stop
/// can leave the container stopped or absent. The log says which.
pub struct UpdateOrchestrator {
    gateway: Arc<dyn EngineGateway>,
    spinner_interval: Duration,
    step: UpdateStep,
    log: ProgressLog,
    progress: mpsc::Sender<UpdateProgress>,
}

impl UpdateOrchestrator {
    pub fn new(
        gateway: Arc<dyn EngineGateway>,
        config: &MirrorConfig,
    ) -> (Self, mpsc::Receiver<UpdateProgress>) {
        let (progress, rx) = mpsc::channel(config.event_queue_capacity.max(1));
        let orchestrator = Self {
            gateway,
            spinner_interval: config.spinner_interval(),
            step: UpdateStep::Pulling,
            log: ProgressLog::new(),
            progress,
        };
        (orchestrator, rx)
    }

    pub async fn run(mut self, container: &Container) -> Result<UpdateOutcome, UpdateError> {
        let gateway = Arc::clone(&self.gateway);
        let id = container.id().clone();
        let reference = container.image_reference().to_owned();
        tracing::info!("updating container {} from {reference}", container.name());

        if let Err(source) = self.pull(&reference).await {
            self.log.push(format!("Error pull image: {source}"));
            return Err(self.fail(UpdateError::Pull { reference, source }).await);
        }

        let mut details = match gateway.inspect_container(&id).await {
            Ok(details) => details,
            Err(source) => {
                self.log.push(format!("Error get config: {source}"));
                let err = UpdateError::ConfigurationUnavailable {
                    container: container.name().to_owned(),
                    source,
                };
                return Err(self.fail(err).await);
            }
        };
        let name = details.display_name().to_owned();

        self.advance(UpdateStep::Stopping)?;
        self.spin(&name, gateway.stop_container(&id)).await?;

        self.advance(UpdateStep::Removing)?;
        self.spin(&name, gateway.remove_container(&id)).await?;

        self.advance(UpdateStep::Recreating)?;
        let new_id = self
            .spin(&name, async {
                let version = gateway.server_version().await?;
                sanitize_for_recreate(&mut details, &version.api_version);
                gateway.create_container(&name, &details).await
            })
            .await?;

        self.advance(UpdateStep::Starting)?;
        self.spin(&name, gateway.start_container(&new_id)).await?;

        self.advance(UpdateStep::Done)?;
        self.log.push(format!("Updated {name}"));
        self.emit().await;
        tracing::info!("container {name} updated, new id {}", new_id.short());

        Ok(UpdateOutcome {
            new_container_id: new_id,
            lines: self.log.into_lines(),
        })
    }

    async fn pull(&mut self, reference: &str) -> Result<(), RuntimeError> {
        let step = self.step;
        let log = &mut self.log;
        let progress = &self.progress;
        let mut on_message = |message: PullProgress| {
            log.record_pull(&message);
            // A lagging consumer misses intermediate snapshots; the next one
            // carries the full log anyway.
            let _ = progress.try_send(UpdateProgress {
                step,
                lines: log.lines().to_vec(),
            });
        };
        let result = self.gateway.pull_image(reference, &mut on_message).await;
        self.emit().await;
        result
    }

    /// Run `action` while animating a spinner line for the current step.
    async fn spin<T, F>(&mut self, name: &str, action: F) -> Result<T, UpdateError>
    where
        F: Future<Output = Result<T, RuntimeError>>,
    {
        let step = self.step;
        let label = format!("{}: {name}", step.action_label());
        self.log.begin(SPINNER_FRAMES[0], &label);
        self.emit().await;

        tokio::pin!(action);
        let mut ticker = interval_at(
            Instant::now() + self.spinner_interval,
            self.spinner_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut frame = 0;

        let result = loop {
            tokio::select! {
                result = &mut action => break result,
                _ = ticker.tick() => {
                    frame = (frame + 1) % SPINNER_FRAMES.len();
                    self.log.animate(SPINNER_FRAMES[frame], &label);
                    self.emit().await;
                }
            }
        };

        match result {
            Ok(value) => {
                self.log.complete(&label);
                self.emit().await;
                tracing::info!("{label} done");
                Ok(value)
            }
            Err(source) => {
                self.log
                    .fail(format!("Error {}: {source}", step.error_verb()));
                Err(self.fail(UpdateError::Step { step, source }).await)
            }
        }
    }

    fn advance(&mut self, to: UpdateStep) -> Result<(), UpdateError> {
        validate_transition(self.step, to)?;
        self.step = to;
        Ok(())
    }

    async fn fail(&mut self, err: UpdateError) -> UpdateError {
        tracing::warn!("update stopped during {}: {err}", self.step);
        self.step = UpdateStep::Failed;
        self.emit().await;
        err
    }

    async fn emit(&self) {
        let snapshot = UpdateProgress {
            step: self.step,
            lines: self.log.lines().to_vec(),
        };
        if self.progress.send(snapshot).await.is_err() {
            tracing::debug!("update progress dropped: receiver closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_runtime::{MockEngine, MockOp};
    use berth_schema::{ContainerDetails, EndpointSettings, Image, ImageId};

    fn web(engine: &MockEngine) -> Container {
        let mut details = ContainerDetails {
            id: ContainerId::new("c1"),
            name: "/web".to_owned(),
            image: ImageId::new("sha256:old"),
            ..ContainerDetails::default()
        };
        details.config.image = "nginx:latest".to_owned();
        details.network_settings.networks.insert(
            "bridge".to_owned(),
            EndpointSettings {
                mac_address: "02:42:ac:11:00:02".to_owned(),
                ..EndpointSettings::default()
            },
        );
        engine.add_container(details.clone());
        Container::new(details)
    }

    fn setup() -> (Arc<MockEngine>, Container) {
        let engine = Arc::new(MockEngine::new());
        engine.add_image(Image {
            id: ImageId::new("sha256:old"),
            repo_tags: vec!["nginx:latest".to_owned()],
            ..Image::default()
        });
        engine.set_pull_result(
            "nginx:latest",
            Image {
                id: ImageId::new("sha256:new"),
                repo_tags: vec!["nginx:latest".to_owned()],
                ..Image::default()
            },
        );
        engine.set_pull_transcript(
            "nginx:latest",
            vec![
                PullProgress::new("Pulling from library/nginx").with_layer("latest"),
                PullProgress::new("Downloading").with_layer("l1").with_progress("[=> ]"),
                PullProgress::new("Pull complete").with_layer("l1"),
                PullProgress::new("Status: Downloaded newer image for nginx:latest"),
            ],
        );
        let container = web(&engine);
        (engine, container)
    }

    fn collect(mut rx: mpsc::Receiver<UpdateProgress>) -> tokio::task::JoinHandle<Vec<UpdateProgress>> {
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(p) = rx.recv().await {
                seen.push(p);
            }
            seen
        })
    }

    #[tokio::test]
    async fn successful_update_runs_every_step() {
        let (engine, container) = setup();
        let (orchestrator, rx) = UpdateOrchestrator::new(engine.clone(), &MirrorConfig::default());
        let snapshots = collect(rx);

        let outcome = orchestrator.run(&container).await.unwrap();
        assert_eq!(
            outcome.lines,
            vec![
                "Pulling from library/nginx",
                "Pull complete",
                "Status: Downloaded newer image for nginx:latest",
                "✓ Stopping container: web",
                "✓ Removing container: web",
                "✓ Creating container: web",
                "✓ Starting container: web",
                "Updated web",
            ]
        );

        let new_id = outcome.new_container_id.to_string();
        assert_eq!(
            engine.calls(),
            vec![
                "pull nginx:latest".to_owned(),
                "stop c1".to_owned(),
                "remove c1".to_owned(),
                "create web".to_owned(),
                format!("start {new_id}"),
            ]
        );
        let recreated = engine.inspect_container(&new_id).await.unwrap();
        assert!(recreated.state.running);
        assert_eq!(recreated.image, ImageId::new("sha256:new"));

        let snapshots = snapshots.await.unwrap();
        let last = snapshots.last().unwrap();
        assert_eq!(last.step, UpdateStep::Done);
        assert_eq!(last.lines, outcome.lines);
        assert!(snapshots.iter().any(|s| s.step == UpdateStep::Stopping
            && s.lines.last().map(String::as_str) == Some("⠋ Stopping container: web")));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_spinner_interval_still_completes() {
        let (engine, container) = setup();
        engine.delay(MockOp::StopContainer, Duration::from_millis(5));
        let config = MirrorConfig {
            spinner_interval_ms: 0,
            ..MirrorConfig::default()
        };
        let (orchestrator, rx) = UpdateOrchestrator::new(engine.clone(), &config);
        let _snapshots = collect(rx);

        let outcome = orchestrator.run(&container).await.unwrap();
        assert_eq!(outcome.lines.last().unwrap(), "Updated web");
        assert!(outcome
            .lines
            .contains(&"✓ Stopping container: web".to_owned()));
    }

    #[tokio::test]
    async fn pull_failure_stops_before_touching_the_container() {
        let (engine, container) = setup();
        engine.fail(MockOp::PullImage, "manifest unknown");
        let (orchestrator, rx) = UpdateOrchestrator::new(engine.clone(), &MirrorConfig::default());
        let snapshots = collect(rx);

        let err = orchestrator.run(&container).await.unwrap_err();
        assert!(matches!(err, UpdateError::Pull { .. }));
        assert!(engine.has_container("c1"));
        assert!(engine.calls().is_empty());

        let last = snapshots.await.unwrap().pop().unwrap();
        assert_eq!(last.step, UpdateStep::Failed);
        assert_eq!(
            last.lines.last().unwrap(),
            "Error pull image: engine request failed: manifest unknown"
        );
    }

    #[tokio::test]
    async fn missing_configuration_is_fatal() {
        let (engine, container) = setup();
        engine.fail_for(MockOp::InspectContainer, "c1", "no such container");
        let (orchestrator, rx) = UpdateOrchestrator::new(engine.clone(), &MirrorConfig::default());
        let _snapshots = collect(rx);

        let err = orchestrator.run(&container).await.unwrap_err();
        assert!(matches!(err, UpdateError::ConfigurationUnavailable { .. }));
        assert_eq!(engine.calls(), vec!["pull nginx:latest".to_owned()]);
    }

    #[tokio::test]
    async fn step_failure_replaces_spinner_line_and_stops() {
        let (engine, container) = setup();
        engine.fail(MockOp::CreateContainer, "name conflict");
        let (orchestrator, rx) = UpdateOrchestrator::new(engine.clone(), &MirrorConfig::default());
        let snapshots = collect(rx);

        let err = orchestrator.run(&container).await.unwrap_err();
        assert_eq!(err.step(), UpdateStep::Recreating);
        // The old container is already gone: no rollback.
        assert!(!engine.has_container("c1"));
        assert!(!engine.calls().iter().any(|c| c.starts_with("start")));

        let last = snapshots.await.unwrap().pop().unwrap();
        assert_eq!(last.step, UpdateStep::Failed);
        assert_eq!(
            &last.lines[last.lines.len() - 3..],
            [
                "✓ Stopping container: web",
                "✓ Removing container: web",
                "Error create: engine request failed: name conflict",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn spinner_advances_while_step_runs() {
        let (engine, container) = setup();
        engine.delay(MockOp::StopContainer, Duration::from_millis(350));
        let (orchestrator, rx) = UpdateOrchestrator::new(engine.clone(), &MirrorConfig::default());
        let snapshots = collect(rx);

        orchestrator.run(&container).await.unwrap();
        let frames: Vec<String> = snapshots
            .await
            .unwrap()
            .into_iter()
            .filter(|s| s.step == UpdateStep::Stopping)
            .filter_map(|s| s.lines.last().cloned())
            .collect();
        assert_eq!(
            frames,
            vec![
                "⠋ Stopping container: web",
                "⠙ Stopping container: web",
                "⠹ Stopping container: web",
                "⠸ Stopping container: web",
                "✓ Stopping container: web",
            ]
        );
    }

    #[tokio::test]
    async fn old_engine_gets_mac_addresses_stripped() {
        let (engine, container) = setup();
        engine.set_api_version("1.41");
        let (orchestrator, rx) = UpdateOrchestrator::new(engine.clone(), &MirrorConfig::default());
        let _snapshots = collect(rx);

        orchestrator.run(&container).await.unwrap();
        let submitted = engine.created().pop().unwrap();
        assert_eq!(submitted.network_settings.networks["bridge"].mac_address, "");
    }
}
