//! The work scheduler: waits out the per-block delay, then mines and
//! submits for each planted farmer strictly in order.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pooler_miner::{MinerError, MinerOutcome, MinerOutput, MinerRunner};
use pooler_primitives::{PlantedFarmer, PlantingNotification, WorkJob, WorkResult};
use pooler_relay::WorkSubmitter;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const LOG_TARGET: &str = "scheduler";

#[derive(Debug, Clone)]
pub struct WorkConfig {
    /// Offset from the block timestamp to the mining start; covers the
    /// planting phase plus slack.
    pub work_delay: Duration,
    pub nonce_count: u64,
    /// Added to the nonce count once per recovery attempt.
    pub recovery_nonce_step: u64,
    pub max_recovery_attempts: u32,
}

impl Default for WorkConfig {
    fn default() -> Self {
        Self {
            work_delay: Duration::from_secs(150),
            nonce_count: 10_000_000,
            recovery_nonce_step: 1_000_000,
            max_recovery_attempts: 3,
        }
    }
}

pub struct WorkScheduler {
    miner: MinerRunner,
    submitter: Arc<dyn WorkSubmitter>,
    config: WorkConfig,
}

impl WorkScheduler {
    pub fn new(miner: MinerRunner, submitter: Arc<dyn WorkSubmitter>, config: WorkConfig) -> Self {
        Self { miner, submitter, config }
    }

    pub fn miner(&self) -> &MinerRunner {
        &self.miner
    }

    /// Processes one planting notification to completion. Results come
    /// back in the order the farmers were supplied; on shutdown the batch
    /// aborts at the next per-farmer checkpoint.
    pub async fn run_batch(
        &self,
        notification: &PlantingNotification,
        shutdown: &CancellationToken,
    ) -> Vec<WorkResult> {
        let target_ms =
            notification.block_timestamp * 1000 + self.config.work_delay.as_millis() as u64;
        let now_ms = Utc::now().timestamp_millis().max(0) as u64;
        let wait = Duration::from_millis(target_ms.saturating_sub(now_ms));

        if !wait.is_zero() {
            info!(
                target: LOG_TARGET,
                block = notification.block_index,
                wait_ms = wait.as_millis() as u64,
                "Waiting for the work window."
            );
            tokio::select! {
                _ = shutdown.cancelled() => return Vec::new(),
                _ = tokio::time::sleep(wait) => {}
            }
        }

        let mut results = Vec::with_capacity(notification.farmers.len());
        for farmer in &notification.farmers {
            if shutdown.is_cancelled() {
                warn!(
                    target: LOG_TARGET,
                    block = notification.block_index,
                    done = results.len(),
                    total = notification.farmers.len(),
                    "Shutdown requested, aborting the rest of the batch."
                );
                break;
            }
            results.push(self.run_farmer(notification, farmer).await);
        }
        results
    }

    async fn run_farmer(
        &self,
        notification: &PlantingNotification,
        farmer: &PlantedFarmer,
    ) -> WorkResult {
        let mut job = WorkJob::new(notification.block_index, farmer.clone());
        let started = std::time::Instant::now();

        let farmer_hex = match farmer.custodial_secret_key.public_key_hex() {
            Ok(hex) => hex,
            Err(err) => {
                warn!(target: LOG_TARGET, farmer = %farmer.farmer_id, %err, "Bad custodial key.");
                return WorkResult::failed(&job, format!("invalid custodial key: {err}"));
            }
        };
        let entropy_hex = notification.entropy.to_hex();

        let mut last_error = String::new();

        // attempt 0 is the initial run; 1..=max are recoveries with a
        // widened nonce search
        for attempt in 0..=self.config.max_recovery_attempts {
            if attempt > 0 {
                info!(
                    target: LOG_TARGET,
                    block = job.block_index,
                    farmer = %farmer.farmer_id,
                    attempt,
                    "Recovery attempt."
                );
            }

            job.attempts += 1;
            let nonce_count =
                self.config.nonce_count + attempt as u64 * self.config.recovery_nonce_step;

            let outcome = self
                .miner
                .run(&farmer_hex, job.block_index, &entropy_hex, nonce_count)
                .await;

            match outcome {
                Ok(MinerOutcome::Solved(output)) => {
                    match self.submit(farmer, &output).await {
                        Ok(()) => {
                            job.elapsed_ms = started.elapsed().as_millis() as u64;
                            return if attempt == 0 {
                                WorkResult::success(&job, output.nonce, output.hash, output.zeros)
                            } else {
                                WorkResult::recovered(&job, output.nonce, output.hash, output.zeros)
                            };
                        }
                        // a sound proof that failed submission is terminal:
                        // re-mining cannot help and the miner slot is scarce
                        Err(error) => {
                            warn!(
                                target: LOG_TARGET,
                                block = job.block_index,
                                farmer = %farmer.farmer_id,
                                %error,
                                "Submission failed for a mined proof."
                            );
                            job.elapsed_ms = started.elapsed().as_millis() as u64;
                            return WorkResult::failed_with_proof(
                                &job,
                                output.nonce,
                                output.hash,
                                output.zeros,
                                error,
                            );
                        }
                    }
                }
                Ok(MinerOutcome::TimedOut { stderr }) => {
                    last_error = trim_diagnostic("miner timed out", &stderr);
                }
                Ok(MinerOutcome::Malformed { stderr }) => {
                    last_error = trim_diagnostic("miner produced no parseable output", &stderr);
                }
                Err(MinerError::Cancelled) => {
                    job.elapsed_ms = started.elapsed().as_millis() as u64;
                    return WorkResult::failed(&job, "mining cancelled by shutdown");
                }
                Err(err) => {
                    last_error = err.to_string();
                }
            }
        }

        job.elapsed_ms = started.elapsed().as_millis() as u64;
        warn!(
            target: LOG_TARGET,
            block = job.block_index,
            farmer = %farmer.farmer_id,
            attempts = job.attempts,
            "Recovery attempts exhausted."
        );
        WorkResult::failed(&job, last_error)
    }

    async fn submit(&self, farmer: &PlantedFarmer, output: &MinerOutput) -> Result<(), String> {
        let hash: [u8; 32] = hex::decode(&output.hash)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| format!("miner hash {:?} is not 32 bytes of hex", output.hash))?;

        self.submitter
            .submit_work(farmer, hash, output.nonce)
            .await
            .map(|submission| {
                info!(
                    target: LOG_TARGET,
                    farmer = %farmer.farmer_id,
                    nonce = output.nonce,
                    zeros = output.zeros,
                    tx_hash = ?submission.tx_hash,
                    "Work proof submitted."
                );
            })
            .map_err(|err| err.to_string())
    }
}

fn trim_diagnostic(prefix: &str, stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        prefix.to_string()
    } else {
        // keep only the tail; miner stderr can be megabytes of progress
        let tail: String = stderr.chars().rev().take(200).collect::<Vec<_>>().into_iter().rev().collect();
        format!("{prefix}: {tail}")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pooler_miner::MinerConfig;
    use pooler_primitives::{strkey, Entropy, SecretSeed, WorkStatus};
    use pooler_relay::{SubmitError, WorkSubmission};

    use super::*;

    /// Scripted submitter: pops pre-programmed responses, defaults to
    /// success, records every call.
    #[derive(Default)]
    struct MockSubmitter {
        responses: Mutex<VecDeque<Result<WorkSubmission, SubmitError>>>,
        calls: Mutex<Vec<(String, u64)>>,
    }

    impl MockSubmitter {
        fn with_responses(
            responses: Vec<Result<WorkSubmission, SubmitError>>,
        ) -> Arc<Self> {
            Arc::new(Self { responses: Mutex::new(responses.into()), calls: Default::default() })
        }

        fn calls(&self) -> Vec<(String, u64)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl WorkSubmitter for MockSubmitter {
        async fn submit_work(
            &self,
            farmer: &PlantedFarmer,
            _hash: [u8; 32],
            nonce: u64,
        ) -> Result<WorkSubmission, SubmitError> {
            self.calls.lock().push((farmer.farmer_id.clone(), nonce));
            self.responses
                .lock()
                .pop_front()
                .unwrap_or(Ok(WorkSubmission { tx_hash: Some("AAA".into()) }))
        }
    }

    fn write_miner_script(dir: &tempfile::TempDir, script: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("miner.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn farmer(id: &str) -> PlantedFarmer {
        let seed: [u8; 32] = core::array::from_fn(|i| i as u8 ^ id.len() as u8);
        let public_key = public_key_of(&seed);
        PlantedFarmer {
            farmer_id: id.into(),
            custodial_wallet: strkey::encode_account(&public_key),
            custodial_secret_key: SecretSeed::new(strkey::encode_seed(&seed)),
            stake_amount: "1000000".into(),
            planting_time: None,
        }
    }

    fn public_key_of(seed: &[u8; 32]) -> [u8; 32] {
        SecretSeed::new(strkey::encode_seed(seed)).public_key().unwrap()
    }

    fn notification(farmers: Vec<PlantedFarmer>) -> PlantingNotification {
        PlantingNotification {
            block_index: 201,
            entropy: Entropy::new([0xab; 32]),
            // far in the past so no work-window sleep happens
            block_timestamp: 1,
            farmers,
        }
    }

    fn scheduler_with(
        dir: &tempfile::TempDir,
        script: &str,
        submitter: Arc<MockSubmitter>,
        config: WorkConfig,
    ) -> WorkScheduler {
        let miner = MinerRunner::new(
            MinerConfig {
                bin: write_miner_script(dir, script),
                timeout: Duration::from_millis(400),
            },
            CancellationToken::new(),
        );
        WorkScheduler::new(miner, submitter, config)
    }

    fn fast_config() -> WorkConfig {
        WorkConfig { work_delay: Duration::from_secs(0), ..WorkConfig::default() }
    }

    const SOLUTION_HASH: &str =
        "0000000abcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabc";

    #[tokio::test]
    async fn single_farmer_success() {
        let dir = tempfile::tempdir().unwrap();
        let submitter = MockSubmitter::with_responses(vec![]);
        let scheduler = scheduler_with(
            &dir,
            &format!("echo '[12345,\"{SOLUTION_HASH}\"]'"),
            submitter.clone(),
            fast_config(),
        );

        let results = scheduler
            .run_batch(&notification(vec![farmer("F1")]), &CancellationToken::new())
            .await;

        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.status, WorkStatus::Success);
        assert_eq!(result.nonce, Some(12_345));
        assert_eq!(result.zeros, Some(7));
        assert_eq!(result.attempts, 1);
        assert!(!result.compensation_required);
        assert_eq!(result.gap, None);
        assert_eq!(submitter.calls(), vec![("F1".to_string(), 12_345)]);
    }

    #[tokio::test]
    async fn miner_timeout_then_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let submitter = MockSubmitter::with_responses(vec![]);
        // first attempt (default nonce count) stalls past the timeout;
        // the widened recovery run solves immediately
        let script = format!(
            "if [ \"$4\" = \"10000000\" ]; then sleep 30; else echo '[9999,\"{SOLUTION_HASH}\"]'; fi"
        );
        let scheduler = scheduler_with(&dir, &script, submitter.clone(), fast_config());

        let results = scheduler
            .run_batch(&notification(vec![farmer("F1")]), &CancellationToken::new())
            .await;

        let result = &results[0];
        assert_eq!(result.status, WorkStatus::Recovered);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.nonce, Some(9_999));
        assert!(!result.compensation_required);
        assert_eq!(submitter.calls(), vec![("F1".to_string(), 9_999)]);
    }

    #[tokio::test]
    async fn mined_proof_with_failed_submission_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let submitter = MockSubmitter::with_responses(vec![Err(SubmitError::Simulation(
            "Error(Contract, #13)".into(),
        ))]);
        let scheduler = scheduler_with(
            &dir,
            &format!("echo '[77,\"{SOLUTION_HASH}\"]'"),
            submitter.clone(),
            fast_config(),
        );

        let results = scheduler
            .run_batch(&notification(vec![farmer("F1")]), &CancellationToken::new())
            .await;

        let result = &results[0];
        assert_eq!(result.status, WorkStatus::Failed);
        assert!(result.compensation_required);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.nonce, Some(77));
        assert_eq!(result.hash.as_deref(), Some(SOLUTION_HASH));
        assert!(result.error.as_deref().unwrap().contains("Error(Contract, #13)"));
        // no re-mining after a submission failure
        assert_eq!(submitter.calls().len(), 1);
    }

    #[tokio::test]
    async fn recovery_exhaustion_is_failed_with_compensation() {
        let dir = tempfile::tempdir().unwrap();
        let submitter = MockSubmitter::with_responses(vec![]);
        let scheduler =
            scheduler_with(&dir, "echo 'nothing useful'", submitter.clone(), fast_config());

        let results = scheduler
            .run_batch(&notification(vec![farmer("F1")]), &CancellationToken::new())
            .await;

        let result = &results[0];
        assert_eq!(result.status, WorkStatus::Failed);
        assert!(result.compensation_required);
        assert_eq!(result.attempts, 4); // initial + 3 recoveries
        assert_eq!(result.nonce, None);
        assert!(submitter.calls().is_empty());
    }

    #[tokio::test]
    async fn results_preserve_farmer_order() {
        let dir = tempfile::tempdir().unwrap();
        let submitter = MockSubmitter::with_responses(vec![]);
        let scheduler = scheduler_with(
            &dir,
            &format!("echo '[1,\"{SOLUTION_HASH}\"]'"),
            submitter.clone(),
            fast_config(),
        );

        let farmers = vec![farmer("F1"), farmer("F2"), farmer("F3")];
        let results = scheduler
            .run_batch(&notification(farmers), &CancellationToken::new())
            .await;

        let order: Vec<_> = results.iter().map(|result| result.farmer_id.as_str()).collect();
        assert_eq!(order, ["F1", "F2", "F3"]);
    }

    #[tokio::test]
    async fn waits_for_the_work_window() {
        let dir = tempfile::tempdir().unwrap();
        let submitter = MockSubmitter::with_responses(vec![]);
        let scheduler = scheduler_with(
            &dir,
            &format!("echo '[1,\"{SOLUTION_HASH}\"]'"),
            submitter,
            fast_config(),
        );

        // target two seconds in the future
        let mut notification = notification(vec![farmer("F1")]);
        notification.block_timestamp = (Utc::now().timestamp() + 2) as u64;

        let started = std::time::Instant::now();
        let results = scheduler.run_batch(&notification, &CancellationToken::new()).await;

        assert_eq!(results.len(), 1);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn shutdown_aborts_between_farmers() {
        let dir = tempfile::tempdir().unwrap();
        let submitter = MockSubmitter::with_responses(vec![]);
        let scheduler = scheduler_with(
            &dir,
            &format!("sleep 0.2\necho '[1,\"{SOLUTION_HASH}\"]'"),
            submitter,
            fast_config(),
        );

        let shutdown = CancellationToken::new();
        let cancel = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                shutdown.cancel();
            }
        });

        let results = scheduler
            .run_batch(&notification(vec![farmer("F1"), farmer("F2"), farmer("F3")]), &shutdown)
            .await;
        cancel.await.unwrap();

        assert!(results.len() < 3);
    }
}
