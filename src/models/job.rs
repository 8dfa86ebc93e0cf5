use std::fmt;
use std::time::{Duration, Instant};

/// Title used until the extractor reports metadata.
pub const UNKNOWN_TITLE: &str = "Unknown";

/// Lifecycle state of a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Fetching,
    Downloading,
    Processing,
    Done,
    Failed,
    Skipped,
}

impl JobState {
    /// Done, Failed and Skipped are terminal; a job never leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Skipped)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobState::Pending => "pending",
            JobState::Fetching => "fetching",
            JobState::Downloading => "downloading",
            JobState::Processing => "processing",
            JobState::Done => "done",
            JobState::Failed => "failed",
            JobState::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

/// One requested download unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub url: String,
    pub index: usize,
    pub title: String,
    pub state: JobState,
    /// Only populated when `state == Failed`
    pub error: Option<String>,
}

impl Job {
    pub fn new(index: usize, url: String) -> Self {
        Self {
            url,
            index,
            title: UNKNOWN_TITLE.to_string(),
            state: JobState::Pending,
            error: None,
        }
    }
}

/// Final report of a batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_bytes: u64,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.successful == self.total
    }
}

/// Working state of one orchestrator invocation.
///
/// Owned by the worker task; the only field touched from another thread is the
/// cancellation flag, which lives outside this struct.
#[derive(Debug)]
pub struct BatchRun {
    jobs: Vec<Job>,
    current_index: usize,
    pub total_bytes_downloaded: u64,
    pub start_time: Instant,
    pub current_job_start_time: Option<Instant>,
}

impl BatchRun {
    /// Create a run from already-validated URLs, preserving their order.
    pub fn new(urls: Vec<String>) -> Self {
        let jobs = urls
            .into_iter()
            .enumerate()
            .map(|(index, url)| Job::new(index, url))
            .collect();

        Self {
            jobs,
            current_index: 0,
            total_bytes_downloaded: 0,
            start_time: Instant::now(),
            current_job_start_time: None,
        }
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn job(&self, index: usize) -> &Job {
        &self.jobs[index]
    }

    /// Begin work on the job at the cursor.
    pub fn begin_job(&mut self, index: usize) -> &mut Job {
        debug_assert_eq!(index, self.current_index, "jobs are processed strictly in order");
        self.current_job_start_time = Some(Instant::now());
        let job = &mut self.jobs[index];
        job.state = JobState::Fetching;
        job
    }

    pub fn set_state(&mut self, index: usize, state: JobState) {
        let job = &mut self.jobs[index];
        if !job.state.is_terminal() {
            job.state = state;
        }
    }

    pub fn set_title(&mut self, index: usize, title: impl Into<String>) {
        self.jobs[index].title = title.into();
    }

    /// Mark the current job done and advance the cursor.
    pub fn complete_job(&mut self, index: usize, bytes: u64) {
        let job = &mut self.jobs[index];
        job.state = JobState::Done;
        job.error = None;
        self.total_bytes_downloaded = self.total_bytes_downloaded.saturating_add(bytes);
        self.advance(index);
    }

    /// Mark the current job failed and advance the cursor.
    pub fn fail_job(&mut self, index: usize, message: String) {
        let job = &mut self.jobs[index];
        job.state = JobState::Failed;
        job.error = Some(message);
        self.advance(index);
    }

    /// Mark every job from `from` onward as skipped and move the cursor to the end.
    ///
    /// Returns how many jobs were skipped.
    pub fn skip_remaining(&mut self, from: usize) -> usize {
        let mut skipped = 0;
        for job in self.jobs.iter_mut().skip(from) {
            if !job.state.is_terminal() {
                job.state = JobState::Skipped;
                skipped += 1;
            }
        }
        self.current_index = self.jobs.len();
        skipped
    }

    /// Time spent on the current job so far.
    pub fn current_job_elapsed(&self) -> Duration {
        self.current_job_start_time
            .map(|start| start.elapsed())
            .unwrap_or_default()
    }

    /// Cursor bounds hold and every job before the cursor is terminal.
    pub fn invariant_holds(&self) -> bool {
        self.current_index <= self.jobs.len()
            && self.jobs[..self.current_index]
                .iter()
                .all(|job| job.state.is_terminal())
    }

    pub fn count(&self, state: JobState) -> usize {
        self.jobs.iter().filter(|job| job.state == state).count()
    }

    /// Fold the run into its final report.
    pub fn summary(&self, cancelled: bool) -> BatchSummary {
        BatchSummary {
            total: self.jobs.len(),
            successful: self.count(JobState::Done),
            failed: self.count(JobState::Failed),
            skipped: self.count(JobState::Skipped),
            total_bytes: self.total_bytes_downloaded,
            elapsed: self.start_time.elapsed(),
            cancelled,
        }
    }

    fn advance(&mut self, index: usize) {
        self.current_index = index + 1;
        debug_assert!(self.invariant_holds());
    }
}
