//! Status polling.
//!
//! [`Repeater`] drives a step until it yields a value, sleeping the policy
//! interval in between and giving up after the policy timeout.
//! [`DeploymentPoller`] builds the two waits the installer needs on top of it.

use crate::api::ServerApi;
use crate::error::{DeployError, DeployResult};
use crate::model::{AppStatus, ApplicationRecord, PollOutcome, PollPolicy};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

pub(crate) struct Repeater {
    policy: PollPolicy,
}

impl Repeater {
    pub(crate) fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    /// Call `step` with the 1-based attempt number until it returns
    /// `Ok(Some(_))` or an error. `Ok(None)` means keep waiting.
    ///
    /// `app_id` and the last status returned by `last_status` only feed the
    /// timeout error.
    pub(crate) async fn until<T, F, Fut>(
        &self,
        app_id: &str,
        last_status: impl Fn() -> String,
        mut step: F,
    ) -> DeployResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = DeployResult<Option<T>>>,
    {
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if let Some(done) = step(attempt).await? {
                return Ok(done);
            }
            let pause = match self.policy.timeout {
                Some(limit) => {
                    let remaining = limit.saturating_sub(started.elapsed());
                    if remaining.is_zero() {
                        return Err(DeployError::WaitTimeout {
                            app_id: app_id.to_string(),
                            waited: whole_millis(started.elapsed()).into(),
                            last_status: last_status(),
                        });
                    }
                    // The last query lands on the deadline, not an interval past it.
                    self.policy.interval.min(remaining)
                }
                None => self.policy.interval,
            };
            tokio::time::sleep(pause).await;
        }
    }
}

fn whole_millis(elapsed: Duration) -> Duration {
    Duration::from_millis(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

/// Look up one application by id; `None` when the server does not list it.
async fn fetch_one<A: ServerApi>(api: &A, app_id: &str) -> DeployResult<Option<ApplicationRecord>> {
    let apps = api.application_get_status(&[app_id.to_string()]).await?;
    Ok(apps.into_iter().find(|a| a.id == app_id))
}

pub(crate) struct DeploymentPoller<'a, A> {
    api: &'a A,
    repeater: Repeater,
}

impl<'a, A: ServerApi> DeploymentPoller<'a, A> {
    pub(crate) fn new(api: &'a A, policy: PollPolicy) -> Self {
        Self {
            api,
            repeater: Repeater::new(policy),
        }
    }

    /// Wait until `app_id` reports `deployed`. An error-like status aborts
    /// with the server's message; anything else, including an application
    /// that is not listed yet, keeps waiting.
    pub(crate) async fn wait_deployed(&self, app_id: &str) -> DeployResult<PollOutcome> {
        let api = self.api;
        let last = std::cell::RefCell::new(String::from("unknown"));
        let outcome = self
            .repeater
            .until(
                app_id,
                || last.borrow().clone(),
                |attempt| {
                    let last = &last;
                    async move {
                        let Some(app) = fetch_one(api, app_id).await? else {
                            debug!(app_id, attempt, "Application not listed yet");
                            *last.borrow_mut() = "notListed".to_string();
                            return Ok(None);
                        };
                        debug!(app_id, attempt, status = %app.status, "Polled deployment status");
                        *last.borrow_mut() = app.status.clone();
                        match app.classify() {
                            AppStatus::ErrorLike => Err(DeployError::Deployment {
                                app_id: app.id.clone(),
                                message: app.error_message(),
                                status: app.status,
                            }),
                            AppStatus::Deployed => Ok(Some(PollOutcome {
                                final_status: app.status.clone(),
                                application: app,
                                attempts: attempt,
                            })),
                            AppStatus::NotExists | AppStatus::InProgress => Ok(None),
                        }
                    }
                },
            )
            .await?;
        info!(app_id, attempts = outcome.attempts, "Application deployed");
        Ok(outcome)
    }

    /// Wait until no deployment of `app_id` is running. Returns the settled
    /// snapshot, or `None` if the application disappeared meanwhile.
    pub(crate) async fn wait_idle(&self, app_id: &str) -> DeployResult<Option<ApplicationRecord>> {
        let api = self.api;
        let last = std::cell::RefCell::new(String::from("unknown"));
        self.repeater
            .until(
                app_id,
                || last.borrow().clone(),
                |attempt| {
                    let last = &last;
                    async move {
                        let app = fetch_one(api, app_id).await?;
                        let status = app
                            .as_ref()
                            .map(ApplicationRecord::classify)
                            .unwrap_or(AppStatus::NotExists);
                        *last.borrow_mut() = app
                            .as_ref()
                            .map(|a| a.status.clone())
                            .unwrap_or_else(|| "notExists".to_string());
                        debug!(app_id, attempt, status = ?status, "Waiting for running deployment");
                        if status.is_terminal() {
                            Ok(Some(app))
                        } else {
                            Ok(None)
                        }
                    }
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeploymentRequest, LibraryRecord, UpdateRequest};
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::path::Path;

    /// Answers filtered status queries from a script; the last entry repeats.
    struct ScriptedApi {
        script: RefCell<VecDeque<Option<&'static str>>>,
        queries: Cell<u32>,
    }

    impl ScriptedApi {
        fn new(statuses: &[&'static str]) -> Self {
            Self::with_gaps(&statuses.iter().map(|s| Some(*s)).collect::<Vec<_>>())
        }

        fn with_gaps(statuses: &[Option<&'static str>]) -> Self {
            Self {
                script: RefCell::new(statuses.iter().copied().collect()),
                queries: Cell::new(0),
            }
        }
    }

    impl ServerApi for ScriptedApi {
        async fn application_get_status(&self, app_ids: &[String]) -> DeployResult<Vec<ApplicationRecord>> {
            self.queries.set(self.queries.get() + 1);
            let mut script = self.script.borrow_mut();
            let next = if script.len() > 1 {
                script.pop_front().flatten()
            } else {
                script.front().copied().flatten()
            };
            Ok(next
                .map(|status| ApplicationRecord {
                    id: app_ids[0].clone(),
                    base_url: "http://default-server/blog".into(),
                    user_app_name: "blog".into(),
                    status: status.into(),
                    messages: if AppStatus::classify(status) == AppStatus::ErrorLike {
                        vec!["post-stage hook exited with 1".into()]
                    } else {
                        vec![]
                    },
                })
                .into_iter()
                .collect())
        }

        async fn application_deploy(&self, _: &DeploymentRequest) -> DeployResult<ApplicationRecord> {
            unreachable!("poller never deploys")
        }

        async fn application_update(&self, _: &UpdateRequest) -> DeployResult<ApplicationRecord> {
            unreachable!("poller never updates")
        }

        async fn library_version_deploy(&self, _: &Path) -> DeployResult<LibraryRecord> {
            unreachable!("poller never deploys libraries")
        }
    }

    fn fast_policy() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            timeout: Some(Duration::from_secs(5)),
        }
    }

    #[tokio::test]
    async fn test_error_status_fails_after_three_queries() {
        let api = ScriptedApi::new(&["deploying", "deploying", "error"]);
        let err = DeploymentPoller::new(&api, fast_policy())
            .wait_deployed("7")
            .await
            .unwrap_err();
        assert_eq!(api.queries.get(), 3);
        match err {
            DeployError::Deployment { app_id, status, message } => {
                assert_eq!(app_id, "7");
                assert_eq!(status, "error");
                assert_eq!(message, "post-stage hook exited with 1");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deployed_status_succeeds_after_two_queries() {
        let api = ScriptedApi::new(&["deploying", "deployed"]);
        let outcome = DeploymentPoller::new(&api, fast_policy())
            .wait_deployed("7")
            .await
            .unwrap();
        assert_eq!(api.queries.get(), 2);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.final_status, "deployed");
        assert_eq!(outcome.application.id, "7");
    }

    #[tokio::test]
    async fn test_suffixed_error_status_fails() {
        let api = ScriptedApi::new(&["uploadPending", "stageError"]);
        let err = DeploymentPoller::new(&api, fast_policy())
            .wait_deployed("3")
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Deployment { ref status, .. } if status == "stageError"));
    }

    #[tokio::test]
    async fn test_unlisted_and_not_exists_keep_waiting() {
        let api = ScriptedApi::with_gaps(&[None, Some("notExists"), Some("deployed")]);
        let outcome = DeploymentPoller::new(&api, fast_policy())
            .wait_deployed("9")
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn test_wait_deployed_times_out() {
        let api = ScriptedApi::new(&["deploying"]);
        let policy = PollPolicy {
            interval: Duration::from_millis(2),
            timeout: Some(Duration::from_millis(20)),
        };
        let err = DeploymentPoller::new(&api, policy)
            .wait_deployed("4")
            .await
            .unwrap_err();
        match err {
            DeployError::WaitTimeout { app_id, last_status, .. } => {
                assert_eq!(app_id, "4");
                assert_eq!(last_status, "deploying");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(api.queries.get() >= 2);
    }

    #[tokio::test]
    async fn test_wait_idle_returns_settled_snapshot() {
        let api = ScriptedApi::new(&["deploying", "staging", "error"]);
        let settled = DeploymentPoller::new(&api, fast_policy())
            .wait_idle("5")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(settled.status, "error");
        assert_eq!(api.queries.get(), 3);
    }

    #[tokio::test]
    async fn test_wait_idle_treats_vanished_app_as_settled() {
        let api = ScriptedApi::with_gaps(&[Some("deploying"), None]);
        let settled = DeploymentPoller::new(&api, fast_policy())
            .wait_idle("5")
            .await
            .unwrap();
        assert!(settled.is_none());
        assert_eq!(api.queries.get(), 2);
    }

    #[tokio::test]
    async fn test_timeout_shorter_than_interval_is_honoured() {
        let repeater = Repeater::new(PollPolicy {
            interval: Duration::from_millis(800),
            timeout: Some(Duration::from_millis(20)),
        });
        let calls = Cell::new(0u32);
        let started = Instant::now();
        let err = repeater
            .until("9", || "deploying".to_string(), |_| {
                calls.set(calls.get() + 1);
                async { Ok::<Option<()>, DeployError>(None) }
            })
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(elapsed < Duration::from_millis(400), "waited {elapsed:?}");
        assert_eq!(calls.get(), 2);
        assert!(matches!(err, DeployError::WaitTimeout { .. }));
    }

    #[tokio::test]
    async fn test_timeout_reports_whole_milliseconds() {
        let repeater = Repeater::new(PollPolicy {
            interval: Duration::from_millis(3),
            timeout: Some(Duration::from_millis(10)),
        });
        let err = repeater
            .until("9", || "deploying".to_string(), |_| async {
                Ok::<Option<()>, DeployError>(None)
            })
            .await
            .unwrap_err();
        match err {
            DeployError::WaitTimeout { waited, .. } => {
                let waited: Duration = waited.into();
                assert_eq!(waited.subsec_nanos() % 1_000_000, 0);
                assert!(waited >= Duration::from_millis(10));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_whole_millis_truncates() {
        assert_eq!(
            whole_millis(Duration::from_nanos(801_135_445)),
            Duration::from_millis(801)
        );
    }

    #[tokio::test]
    async fn test_repeater_without_timeout_runs_until_done() {
        let repeater = Repeater::new(PollPolicy {
            interval: Duration::ZERO,
            timeout: None,
        });
        let calls = Cell::new(0u32);
        let value = repeater
            .until("x", String::new, |attempt| {
                calls.set(calls.get() + 1);
                async move { Ok(if attempt == 50 { Some(attempt) } else { None }) }
            })
            .await
            .unwrap();
        assert_eq!(value, 50);
        assert_eq!(calls.get(), 50);
    }
}
