use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use clap::Args;
use serde::{Deserialize, Serialize};

use super::CommandResult;

#[derive(Debug, Args)]
pub struct IngestArgs {
    #[arg(long, help = "Path to the policy document text file")]
    pub file: PathBuf,

    #[arg(long, help = "Stable document identifier, e.g. leave-policy.md")]
    pub document_id: String,

    #[arg(long, help = "Policy identifier shared across document versions")]
    pub policy_id: String,

    #[arg(long, help = "Document version; higher versions win retrieval ties")]
    pub version: u32,

    #[arg(long, help = "Date the policy takes effect (YYYY-MM-DD)")]
    pub effective_date: NaiveDate,

    #[arg(long, default_value = "http://127.0.0.1:8080", help = "Base URL of the hrdesk-server")]
    pub server: String,

    #[arg(long, help = "Admin employee id used as the acting principal")]
    pub employee_id: String,

    #[arg(long, help = "Bearer token forwarded to the leave service on behalf of the principal")]
    pub token: String,
}

#[derive(Debug, Serialize)]
struct IngestBody {
    principal: PrincipalBody,
    document_id: String,
    policy_id: String,
    version: u32,
    effective_date: NaiveDate,
    text: String,
}

#[derive(Debug, Serialize)]
struct PrincipalBody {
    employee_id: String,
    name: String,
    role: &'static str,
    token: String,
}

#[derive(Debug, Deserialize)]
struct IngestReply {
    document_id: String,
    chunk_count: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorReply {
    error: String,
}

pub fn run(args: IngestArgs) -> CommandResult {
    let text = match fs::read_to_string(&args.file) {
        Ok(text) => text,
        Err(error) => {
            return CommandResult::failure(
                "ingest",
                "io",
                format!("failed to read `{}`: {error}", args.file.display()),
                2,
            );
        }
    };

    let body = IngestBody {
        principal: PrincipalBody {
            employee_id: args.employee_id.clone(),
            name: args.employee_id,
            role: "admin",
            token: args.token,
        },
        document_id: args.document_id,
        policy_id: args.policy_id,
        version: args.version,
        effective_date: args.effective_date,
        text,
    };

    let url = format!("{}/api/v1/documents", args.server.trim_end_matches('/'));

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "ingest",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                1,
            );
        }
    };

    let result = runtime.block_on(async {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|error| format!("failed to build http client: {error}"))?;

        let response = client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|error| format!("request to `{url}` failed: {error}"))?;

        let status = response.status();
        if status.is_success() {
            let reply: IngestReply = response
                .json()
                .await
                .map_err(|error| format!("malformed response from `{url}`: {error}"))?;
            return Ok(reply);
        }

        let detail = match response.json::<ErrorReply>().await {
            Ok(reply) => reply.error,
            Err(_) => format!("server rejected the request with HTTP {}", status.as_u16()),
        };
        Err(detail)
    });

    match result {
        Ok(reply) => CommandResult::success(
            "ingest",
            format!("ingested `{}` as {} chunk(s)", reply.document_id, reply.chunk_count),
        ),
        Err(error) => CommandResult::failure("ingest", "server", error, 1),
    }
}
