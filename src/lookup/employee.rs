//! Employee service lookups.

use serde::{Deserialize, Serialize};

use crate::bridge::RpcClient;
use crate::error::RpcResult;

const FIND_EMPLOYEE_BY_ID: &str = "find_employee_by_id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub employee_id: String,
    pub name: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
}

#[derive(Serialize)]
struct EmployeeParams<'a> {
    employee_id: &'a str,
}

impl RpcClient {
    pub async fn find_employee_by_id(&self, employee_id: &str) -> RpcResult<Employee> {
        self.call(
            &self.queues().employee,
            FIND_EMPLOYEE_BY_ID,
            &EmployeeParams { employee_id },
        )
        .await
    }
}
