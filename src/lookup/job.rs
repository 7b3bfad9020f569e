//! Job and job level lookups, served by the organization service.

use serde::{Deserialize, Serialize};

use crate::bridge::RpcClient;
use crate::error::RpcResult;

const FIND_JOB_BY_ID: &str = "find_job_by_id";
const FIND_JOB_LEVEL_BY_ID: &str = "find_job_level_by_id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub name: String,
    #[serde(default)]
    pub organization_structure_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLevel {
    pub job_level_id: String,
    pub name: String,
    pub level: i64,
}

#[derive(Serialize)]
struct JobParams<'a> {
    job_id: &'a str,
}

#[derive(Serialize)]
struct JobLevelParams<'a> {
    job_level_id: &'a str,
}

impl RpcClient {
    pub async fn find_job_by_id(&self, job_id: &str) -> RpcResult<Job> {
        self.call(
            &self.queues().organization,
            FIND_JOB_BY_ID,
            &JobParams { job_id },
        )
        .await
    }

    pub async fn find_job_level_by_id(&self, job_level_id: &str) -> RpcResult<JobLevel> {
        self.call(
            &self.queues().organization,
            FIND_JOB_LEVEL_BY_ID,
            &JobLevelParams { job_level_id },
        )
        .await
    }
}
