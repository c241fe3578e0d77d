//! The queue itself: submission, claiming, and result persistence.
//!
//! Layout under the queue root:
//!
//! ```text
//! <root>/pending/<id>.json    command records awaiting a worker
//! <root>/claimed/<id>.json    command record of the job being processed
//! <root>/results/<id>.json    terminal result records
//! ```
//!
//! Claiming is an atomic rename from `pending/` to `claimed/`, so two
//! consumers racing for the same record cannot both win: the loser's
//! rename fails with `NotFound` and it moves on to the next candidate.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use vidforge_core::job::GenerationRequest;
use vidforge_core::types::JobId;

use crate::records::{CommandRecord, ResultRecord};

const PENDING_DIR: &str = "pending";
const CLAIMED_DIR: &str = "claimed";
const RESULTS_DIR: &str = "results";

/// Errors from the queue layer.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed record: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Client-side only: the caller stopped waiting. The worker is not
    /// informed and keeps processing the job to completion.
    #[error("Timed out after {waited_secs}s waiting for result of job {job_id}")]
    Timeout { job_id: JobId, waited_secs: u64 },
}

/// Handle to a queue directory shared by producers and one worker.
#[derive(Debug, Clone)]
pub struct JobQueue {
    pending: PathBuf,
    claimed: PathBuf,
    results: PathBuf,
}

impl JobQueue {
    /// Open (creating if necessary) the queue directory structure.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, QueueError> {
        let root = root.as_ref();
        let queue = Self {
            pending: root.join(PENDING_DIR),
            claimed: root.join(CLAIMED_DIR),
            results: root.join(RESULTS_DIR),
        };
        fs::create_dir_all(&queue.pending)?;
        fs::create_dir_all(&queue.claimed)?;
        fs::create_dir_all(&queue.results)?;
        Ok(queue)
    }

    // -----------------------------------------------------------------
    // Producer side
    // -----------------------------------------------------------------

    /// Write a command record into the pending set. Safe to call from
    /// many producers concurrently.
    pub fn submit(&self, request: GenerationRequest) -> Result<JobId, QueueError> {
        let record = CommandRecord::new(request);
        let final_path = self.pending.join(record_file_name(&record.id));

        // Write to a hidden temp name first so a partially written
        // record is never visible to poll_next(), then publish with an
        // atomic rename.
        let tmp_path = self.pending.join(format!(".{}.tmp", record.id));
        write_json(&tmp_path, &record)?;
        fs::rename(&tmp_path, &final_path)?;
        sync_dir(&self.pending)?;

        tracing::debug!(job_id = %record.id, "Command record submitted");
        Ok(record.id)
    }

    /// Read the result record for a job, if one exists yet.
    pub fn result(&self, id: &JobId) -> Result<Option<ResultRecord>, QueueError> {
        let path = self.results.join(record_file_name(id));
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Poll for a result until it appears or `timeout` elapses.
    ///
    /// Client-side bounded wait: elapsing the timeout abandons the wait
    /// only, never the job.
    pub async fn wait_for_result(
        &self,
        id: &JobId,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<ResultRecord, QueueError> {
        let started = Instant::now();
        loop {
            if let Some(record) = self.result(id)? {
                return Ok(record);
            }
            if started.elapsed() >= timeout {
                return Err(QueueError::Timeout {
                    job_id: id.clone(),
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    // -----------------------------------------------------------------
    // Consumer side
    // -----------------------------------------------------------------

    /// Claim the oldest pending command record, if any.
    ///
    /// The record is atomically moved out of the pending set before it
    /// is handed to the caller, so a concurrent consumer can never
    /// claim the same job.
    pub fn poll_next(&self) -> Result<Option<CommandRecord>, QueueError> {
        for id in self.pending_ids()? {
            let pending_path = self.pending.join(record_file_name(&id));
            let claimed_path = self.claimed.join(record_file_name(&id));

            match fs::rename(&pending_path, &claimed_path) {
                Ok(()) => {}
                // Another consumer won the race for this record.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }

            match read_command(&claimed_path) {
                Ok(record) => {
                    tracing::info!(job_id = %record.id, "Claimed command record");
                    return Ok(Some(record));
                }
                Err(e) => {
                    // A corrupt record still gets a terminal result so
                    // its producer is not left waiting forever.
                    tracing::warn!(job_id = %id, error = %e, "Discarding malformed command record");
                    self.fail(&id, format!("malformed command record: {e}"))?;
                }
            }
        }
        Ok(None)
    }

    /// Record a successful outcome. The result record is made durable
    /// before the claimed command record is removed.
    pub fn complete(&self, id: &JobId, output_path: PathBuf) -> Result<(), QueueError> {
        self.write_result(ResultRecord::success(id.clone(), output_path))
    }

    /// Record a failed outcome. Same durability ordering as `complete`.
    pub fn fail(&self, id: &JobId, message: impl Into<String>) -> Result<(), QueueError> {
        self.write_result(ResultRecord::error(id.clone(), message))
    }

    /// Ids of claimed command records with no result: jobs stranded by
    /// a crash mid-processing. Surfaced at worker startup so an
    /// operator can resubmit or discard them; they are never silently
    /// dropped.
    pub fn stranded(&self) -> Result<Vec<JobId>, QueueError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.claimed)? {
            let entry = entry?;
            if let Some(id) = id_from_file_name(&entry.file_name()) {
                if self.result(&id)?.is_none() {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// Number of pending command records (diagnostics only).
    pub fn pending_len(&self) -> Result<usize, QueueError> {
        Ok(self.pending_ids()?.len())
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    /// Pending job ids, oldest first by file modification time.
    fn pending_ids(&self) -> Result<Vec<JobId>, QueueError> {
        let mut entries: Vec<(SystemTime, JobId)> = Vec::new();
        for entry in fs::read_dir(&self.pending)? {
            let entry = entry?;
            let Some(id) = id_from_file_name(&entry.file_name()) else {
                continue;
            };
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push((modified, id));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.as_str().cmp(b.1.as_str())));
        Ok(entries.into_iter().map(|(_, id)| id).collect())
    }

    /// Durably write a result record, then remove the claimed command
    /// record. If the result write fails the command record is left in
    /// place so the job remains operator-recoverable.
    fn write_result(&self, record: ResultRecord) -> Result<(), QueueError> {
        let tmp_path = self.results.join(format!(".{}.tmp", record.id));
        let final_path = self.results.join(record_file_name(&record.id));
        write_json(&tmp_path, &record)?;
        fs::rename(&tmp_path, &final_path)?;
        sync_dir(&self.results)?;

        // Only now is it safe to forget the command.
        let claimed_path = self.claimed.join(record_file_name(&record.id));
        match fs::remove_file(&claimed_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        tracing::debug!(job_id = %record.id, status = ?record.status, "Result record written");
        Ok(())
    }
}

/// Serialize `value` to `path` and flush it to stable storage.
fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), QueueError> {
    let mut file = fs::File::create(path)?;
    file.write_all(&serde_json::to_vec_pretty(value)?)?;
    file.sync_all()?;
    Ok(())
}

/// Flush a directory's metadata so a rename published into it survives
/// power loss. Syncing the file alone does not persist the new name.
fn sync_dir(dir: &Path) -> Result<(), QueueError> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

fn read_command(path: &Path) -> Result<CommandRecord, QueueError> {
    Ok(serde_json::from_slice(&fs::read(path)?)?)
}

fn record_file_name(id: &JobId) -> String {
    format!("{id}.json")
}

fn id_from_file_name(name: &std::ffi::OsStr) -> Option<JobId> {
    let name = name.to_str()?;
    if name.starts_with('.') {
        return None;
    }
    name.strip_suffix(".json")
        .map(|stem| JobId::from_string(stem.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use vidforge_core::job::GenerationRequest;

    fn queue() -> (tempfile::TempDir, JobQueue) {
        let dir = tempfile::tempdir().unwrap();
        let queue = JobQueue::open(dir.path()).unwrap();
        (dir, queue)
    }

    #[test]
    fn submit_then_poll_round_trips_request() {
        let (_dir, queue) = queue();
        let id = queue.submit(GenerationRequest::new("a red fox")).unwrap();

        let record = queue.poll_next().unwrap().expect("one pending record");
        assert_eq!(record.id, id);
        assert_eq!(record.request.prompt, "a red fox");

        // The record left the pending set when it was claimed.
        assert!(queue.poll_next().unwrap().is_none());
    }

    #[test]
    fn complete_writes_result_and_removes_command() {
        let (dir, queue) = queue();
        let id = queue.submit(GenerationRequest::new("x")).unwrap();
        let record = queue.poll_next().unwrap().unwrap();

        queue
            .complete(&record.id, PathBuf::from("/out/video.mp4"))
            .unwrap();

        let result = queue.result(&id).unwrap().expect("result record");
        assert_eq!(result.status, crate::records::ResultStatus::Success);
        assert_eq!(result.output_path.unwrap(), PathBuf::from("/out/video.mp4"));

        // No command record remains anywhere.
        assert!(!dir.path().join("claimed").join(format!("{id}.json")).exists());
        assert!(!dir.path().join("pending").join(format!("{id}.json")).exists());
    }

    #[test]
    fn failed_job_has_nonempty_error_and_no_command_record() {
        let (dir, queue) = queue();
        let id = queue.submit(GenerationRequest::new("x")).unwrap();
        let record = queue.poll_next().unwrap().unwrap();

        queue.fail(&record.id, "engine exploded").unwrap();

        let result = queue.result(&id).unwrap().unwrap();
        assert_eq!(result.status, crate::records::ResultStatus::Error);
        assert!(!result.error.unwrap().is_empty());
        assert!(!dir.path().join("claimed").join(format!("{id}.json")).exists());
    }

    #[test]
    fn crashed_job_is_stranded_not_lost() {
        let (_dir, queue) = queue();
        let id = queue.submit(GenerationRequest::new("x")).unwrap();

        // Worker claims, then "crashes" before writing a result.
        let _record = queue.poll_next().unwrap().unwrap();

        let stranded = queue.stranded().unwrap();
        assert_eq!(stranded, vec![id]);
    }

    #[test]
    fn stranded_excludes_jobs_with_results() {
        let (_dir, queue) = queue();
        let id = queue.submit(GenerationRequest::new("x")).unwrap();
        let record = queue.poll_next().unwrap().unwrap();
        queue.fail(&record.id, "boom").unwrap();

        assert!(queue.stranded().unwrap().is_empty());
        assert!(queue.result(&id).unwrap().is_some());
    }

    #[test]
    fn published_records_survive_queue_reopen() {
        let (dir, queue) = queue();
        let id = queue.submit(GenerationRequest::new("persistent")).unwrap();

        // A fresh handle over the same directory sees the record, as a
        // restarted process would.
        let reopened = JobQueue::open(dir.path()).unwrap();
        let record = reopened.poll_next().unwrap().expect("submitted record");
        assert_eq!(record.id, id);

        reopened.complete(&record.id, PathBuf::from("/out/v.mp4")).unwrap();
        let after_restart = JobQueue::open(dir.path()).unwrap();
        assert!(after_restart.result(&id).unwrap().is_some());
        assert!(after_restart.stranded().unwrap().is_empty());
    }

    #[test]
    fn oldest_record_claimed_first() {
        let (_dir, queue) = queue();
        let first = queue.submit(GenerationRequest::new("first")).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let second = queue.submit(GenerationRequest::new("second")).unwrap();

        assert_eq!(queue.poll_next().unwrap().unwrap().id, first);
        assert_eq!(queue.poll_next().unwrap().unwrap().id, second);
    }

    #[test]
    fn malformed_record_gets_error_result() {
        let (dir, queue) = queue();
        std::fs::write(dir.path().join("pending").join("bogus.json"), b"{not json").unwrap();

        assert!(queue.poll_next().unwrap().is_none());
        let result = queue
            .result(&JobId::from_string("bogus".into()))
            .unwrap()
            .expect("error result for malformed record");
        assert_eq!(result.status, crate::records::ResultStatus::Error);
    }

    #[test]
    fn temp_files_are_invisible_to_poll() {
        let (dir, queue) = queue();
        std::fs::write(dir.path().join("pending").join(".half.tmp"), b"{").unwrap();
        assert!(queue.poll_next().unwrap().is_none());
    }

    #[tokio::test]
    async fn wait_for_result_times_out() {
        let (_dir, queue) = queue();
        let id = queue.submit(GenerationRequest::new("x")).unwrap();

        let err = queue
            .wait_for_result(
                &id,
                Duration::from_millis(30),
                Duration::from_millis(10),
            )
            .await
            .unwrap_err();
        assert_matches!(err, QueueError::Timeout { .. });

        // The job itself is untouched by the client timeout.
        assert_eq!(queue.pending_len().unwrap(), 1);
    }

    #[tokio::test]
    async fn wait_for_result_returns_when_written() {
        let (_dir, queue) = queue();
        let id = queue.submit(GenerationRequest::new("x")).unwrap();
        let record = queue.poll_next().unwrap().unwrap();
        queue.complete(&record.id, PathBuf::from("/out/v.mp4")).unwrap();

        let result = queue
            .wait_for_result(&id, Duration::from_secs(1), Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(result.status, crate::records::ResultStatus::Success);
    }
}
