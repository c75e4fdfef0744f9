//! Tag service: read and reconcile resource tags

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use stratus_core::sets::TagDiff;

use super::Empty;
use crate::client::{Client, Service};
use crate::error::ApiError;
use crate::logid::LogId;

const PAGE_LIMIT: u64 = 100;

/// Six-segment resource name used by the tagging API:
/// `qcs::{service}:{region}:uin/:{resource_type}/{id}`
pub fn build_resource_name(service: &str, resource_type: &str, region: &str, id: &str) -> String {
    format!("qcs::{}:{}:uin/:{}/{}", service, region, resource_type, id)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeResourceTagsRequest<'a> {
    service_type: &'a str,
    resource_prefix: &'a str,
    resource_ids: [&'a str; 1],
    resource_region: &'a str,
    offset: u64,
    limit: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DescribeResourceTagsResponse {
    total_count: u64,
    tags: Option<Vec<ResourceTag>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ResourceTag {
    tag_key: String,
    tag_value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TagPair<'a> {
    tag_key: &'a str,
    tag_value: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TagKey<'a> {
    tag_key: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ModifyResourceTagsRequest<'a> {
    resource: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    replace_tags: Vec<TagPair<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    delete_tags: Vec<TagKey<'a>>,
}

pub struct TagService {
    client: Arc<Client>,
    log_id: LogId,
}

impl TagService {
    pub fn new(client: Arc<Client>, log_id: LogId) -> Self {
        Self { client, log_id }
    }

    /// All tags of one resource
    pub async fn describe_resource_tags(
        &self,
        service_type: &str,
        resource_prefix: &str,
        region: &str,
        id: &str,
    ) -> Result<HashMap<String, String>, ApiError> {
        let mut tags = HashMap::new();
        let mut offset = 0;

        loop {
            let request = DescribeResourceTagsRequest {
                service_type,
                resource_prefix,
                resource_ids: [id],
                resource_region: region,
                offset,
                limit: PAGE_LIMIT,
            };
            let response: DescribeResourceTagsResponse = self
                .client
                .read(&self.log_id, Service::Tag, "DescribeResourceTagsByResourceIds", &request)
                .await?;

            let page = response.tags.unwrap_or_default();
            let count = page.len() as u64;
            tags.extend(page.into_iter().map(|t| (t.tag_key, t.tag_value)));

            offset += count;
            if count < PAGE_LIMIT || offset >= response.total_count {
                break;
            }
        }

        Ok(tags)
    }

    /// Apply a tag diff to the resource named `resource_name`. No call is made for an empty diff.
    pub async fn modify_tags(&self, resource_name: &str, diff: &TagDiff) -> Result<(), ApiError> {
        if diff.is_empty() {
            return Ok(());
        }

        debug!(
            "[{}] Tagging {}: {} replaced, {} deleted",
            self.log_id,
            resource_name,
            diff.replace.len(),
            diff.delete.len()
        );

        let request = ModifyResourceTagsRequest {
            resource: resource_name,
            replace_tags: diff
                .replace
                .iter()
                .map(|(k, v)| TagPair {
                    tag_key: k,
                    tag_value: v,
                })
                .collect(),
            delete_tags: diff.delete.iter().map(|k| TagKey { tag_key: k }).collect(),
        };
        let _: Empty = self
            .client
            .write(&self.log_id, Service::Tag, "ModifyResourceTags", &request)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn resource_name_format() {
        assert_eq!(
            build_resource_name("cvm", "volume", "ap-guangzhou", "disk-123"),
            "qcs::cvm:ap-guangzhou:uin/:volume/disk-123"
        );
    }

    #[test]
    fn modify_request_omits_empty_lists() {
        let request = ModifyResourceTagsRequest {
            resource: "qcs::cvm:ap-guangzhou:uin/:instance/ins-1",
            replace_tags: vec![TagPair {
                tag_key: "env",
                tag_value: "prod",
            }],
            delete_tags: vec![],
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "Resource": "qcs::cvm:ap-guangzhou:uin/:instance/ins-1",
                "ReplaceTags": [{"TagKey": "env", "TagValue": "prod"}]
            })
        );
    }

    #[tokio::test]
    async fn empty_diff_makes_no_call() {
        let config = crate::config::ProviderConfig::new("id", "key", "ap-guangzhou")
            .with_endpoint("http://127.0.0.1:9");
        let client = Arc::new(Client::new(&config).unwrap());
        let service = TagService::new(client, LogId::from("test"));
        let diff = TagDiff {
            replace: BTreeMap::new(),
            delete: vec![],
        };
        service.modify_tags("qcs::cvm:ap-guangzhou:uin/:instance/ins-1", &diff).await.unwrap();
    }
}
