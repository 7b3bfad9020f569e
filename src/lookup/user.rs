//! User service lookups.

use serde::{Deserialize, Serialize};

use crate::bridge::RpcClient;
use crate::error::RpcResult;

const FIND_USER_BY_ID: &str = "find_user_by_id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub employee_id: Option<String>,
}

#[derive(Serialize)]
struct UserParams<'a> {
    user_id: &'a str,
}

impl RpcClient {
    pub async fn find_user_by_id(&self, user_id: &str) -> RpcResult<User> {
        self.call(&self.queues().user, FIND_USER_BY_ID, &UserParams { user_id })
            .await
    }
}
