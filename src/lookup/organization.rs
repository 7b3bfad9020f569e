//! Organization service lookups.

use serde::{Deserialize, Serialize};

use crate::bridge::RpcClient;
use crate::error::RpcResult;

const FIND_ORGANIZATION_BY_ID: &str = "find_organization_by_id";
const FIND_ORGANIZATION_LOCATION_BY_ID: &str = "find_organization_location_by_id";
const FIND_ORGANIZATION_STRUCTURE_BY_ID: &str = "find_organization_structure_by_id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub organization_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationLocation {
    pub organization_location_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationStructure {
    pub organization_structure_id: String,
    pub name: String,
}

#[derive(Serialize)]
struct OrganizationParams<'a> {
    organization_id: &'a str,
}

#[derive(Serialize)]
struct OrganizationLocationParams<'a> {
    organization_location_id: &'a str,
}

#[derive(Serialize)]
struct OrganizationStructureParams<'a> {
    organization_structure_id: &'a str,
}

impl RpcClient {
    pub async fn find_organization_by_id(&self, organization_id: &str) -> RpcResult<Organization> {
        self.call(
            &self.queues().organization,
            FIND_ORGANIZATION_BY_ID,
            &OrganizationParams { organization_id },
        )
        .await
    }

    pub async fn find_organization_location_by_id(
        &self,
        organization_location_id: &str,
    ) -> RpcResult<OrganizationLocation> {
        self.call(
            &self.queues().organization,
            FIND_ORGANIZATION_LOCATION_BY_ID,
            &OrganizationLocationParams {
                organization_location_id,
            },
        )
        .await
    }

    pub async fn find_organization_structure_by_id(
        &self,
        organization_structure_id: &str,
    ) -> RpcResult<OrganizationStructure> {
        self.call(
            &self.queues().organization,
            FIND_ORGANIZATION_STRUCTURE_BY_ID,
            &OrganizationStructureParams {
                organization_structure_id,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use crate::lookup::test_support::client_answering;
    use serde_json::json;

    #[tokio::test]
    async fn organization_lookup_sends_id_and_decodes_reply() {
        let client = client_answering(|envelope| {
            assert_eq!(envelope.message_type, FIND_ORGANIZATION_BY_ID);
            assert_eq!(envelope.target_queue, "organization.requests");
            json!({
                "organization_id": envelope.message_data["organization_id"],
                "name": "Acme",
            })
        });

        let org = client.find_organization_by_id("org-1").await.unwrap();
        assert_eq!(
            org,
            Organization {
                organization_id: "org-1".to_string(),
                name: "Acme".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn location_lookup_uses_its_own_message_type() {
        let client = client_answering(|envelope| {
            assert_eq!(envelope.message_type, FIND_ORGANIZATION_LOCATION_BY_ID);
            json!({"organization_location_id": "loc-1", "name": "Jakarta HQ"})
        });

        let location = client.find_organization_location_by_id("loc-1").await.unwrap();
        assert_eq!(location.name, "Jakarta HQ");
    }

    #[tokio::test]
    async fn structure_lookup_reports_not_found() {
        let client = client_answering(|envelope| {
            assert_eq!(envelope.message_type, FIND_ORGANIZATION_STRUCTURE_BY_ID);
            json!({"error": "organization structure not found"})
        });

        let err = client
            .find_organization_structure_by_id("missing")
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Remote { ref message, .. } if message.contains("not found")));
    }
}
