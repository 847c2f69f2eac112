/// Run configuration shared by the batch driver, assembler, and client.
///
/// Values come from the CLI surface; defaults mirror the long-standing
/// operational defaults of the service deployment.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Address of the running simulation server.
    pub host: String,
    /// Port of the running simulation server.
    pub port: u16,
    /// Number of simulation steps in a single run.
    pub steps: u64,
    /// Sequential repetitions per input row (one submission each).
    pub sequential_reps: usize,
    /// Parallel replications per submission (handled by the remote engine).
    pub parallel_reps: usize,
    /// Name of the CSV file the model writes output to.
    pub output_file: String,
    /// Directory the remote engine writes parquet output to.
    pub scenario_output_dir: String,
    /// Retry budget for failed submissions (total attempts = budget + 1).
    pub retry_attempts: u32,
    /// Seconds between status polls while awaiting completion.
    pub poll_interval_secs: u64,
    /// Model name stamped on every request document.
    pub model_name: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            steps: 0,
            sequential_reps: 1,
            parallel_reps: 1,
            output_file: default_output_file(),
            scenario_output_dir: default_scenario_output_dir(),
            retry_attempts: default_retry_attempts(),
            poll_interval_secs: default_poll_interval_secs(),
            model_name: default_model_name(),
        }
    }
}

impl RunConfig {
    /// Endpoint accepting flat batch submissions.
    #[must_use]
    pub fn batch_url(&self) -> String {
        format!("http://{}:{}/api/simulations/batch", self.host, self.port)
    }

    /// Endpoint accepting stepwise scenario submissions.
    #[must_use]
    pub fn scenario_url(&self) -> String {
        format!("http://{}:{}/api/simulations/scenario", self.host, self.port)
    }
}

fn default_host() -> String {
    "localhost".into()
}

const fn default_port() -> u16 {
    8080
}

fn default_output_file() -> String {
    "csvOutput.csv".into()
}

fn default_scenario_output_dir() -> String {
    "scenarioOutput".into()
}

const fn default_retry_attempts() -> u32 {
    10
}

const fn default_poll_interval_secs() -> u64 {
    10
}

fn default_model_name() -> String {
    "TAU".into()
}
