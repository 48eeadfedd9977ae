//! Application service: LocalAI readiness checks run by `test`.
//!
//! Both checks are diagnostics. They are recorded as optional, so a stopped
//! server or a missing model warns without failing the command.

use std::time::Duration;

use crate::application::ports::{
    CommandRunner, LocalFs, ProgressReporter, combined_output, program_missing,
};
use crate::domain::catalog::LocalAiSettings;
use crate::domain::health::{MODELS_PATH, listed_models};
use crate::domain::module::VerifyRecord;
use crate::domain::service::Service;

pub const MODEL_FILE_CHECK: &str = "localai-model-file";
pub const API_CHECK: &str = "localai-api";

const API_TIMEOUT_SECS: &str = "5";
const API_DEADLINE: Duration = Duration::from_secs(10);

/// The model file check followed by the API check.
pub async fn check_localai(
    runner: &impl CommandRunner,
    fs: &impl LocalFs,
    reporter: &impl ProgressReporter,
    localai: &LocalAiSettings,
    service: &Service,
) -> Vec<VerifyRecord> {
    reporter.step("checking the LocalAI model file...");
    let model_file = model_file(fs, localai);
    reporter.step("checking the LocalAI API...");
    let api = api(runner, localai, service).await;
    for record in [&model_file, &api] {
        if record.passed {
            reporter.success(&format!("{} ok", record.name));
        } else {
            reporter.warn(&format!("{}: {}", record.name, record.detail));
        }
    }
    vec![model_file, api]
}

fn model_file(fs: &impl LocalFs, localai: &LocalAiSettings) -> VerifyRecord {
    let path = localai.model_dir.join(&localai.model_file);
    let passed = fs.exists(&path);
    let detail = if passed {
        path.display().to_string()
    } else {
        format!("{} not found", path.display())
    };
    record(MODEL_FILE_CHECK, passed, detail)
}

async fn api(runner: &impl CommandRunner, localai: &LocalAiSettings, service: &Service) -> VerifyRecord {
    let Some(url) = service.http_url(MODELS_PATH) else {
        return record(API_CHECK, false, "the service has no port".into());
    };
    let out = match runner
        .run_with_timeout("curl", &["-fsS", "--max-time", API_TIMEOUT_SECS, &url], API_DEADLINE)
        .await
    {
        Ok(out) => out,
        Err(e) if program_missing(&e) => {
            return record(API_CHECK, false, format!("curl is not installed; {url} not checked"));
        }
        Err(e) => return record(API_CHECK, false, format!("{url}: {e:#}")),
    };
    if !out.status.success() {
        return record(
            API_CHECK,
            false,
            format!("not responding at {url}: {}", combined_output(&out)),
        );
    }
    match listed_models(&String::from_utf8_lossy(&out.stdout)) {
        Ok(models) if models.iter().any(|m| *m == localai.model_name) => {
            record(API_CHECK, true, format!("{url} lists {}", localai.model_name))
        }
        Ok(models) => {
            let available = if models.is_empty() { "none".to_string() } else { models.join(", ") };
            record(
                API_CHECK,
                false,
                format!("model '{}' not loaded (available: {available})", localai.model_name),
            )
        }
        Err(e) => record(API_CHECK, false, format!("unexpected reply from {url}: {e}")),
    }
}

fn record(name: &str, passed: bool, detail: String) -> VerifyRecord {
    VerifyRecord {
        name: name.into(),
        required: false,
        passed,
        detail,
    }
}
