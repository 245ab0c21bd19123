//! Which resources accept tags
//!
//! Terraform resources are checked against the provider schema (`terraform providers schema
//! -json`). A resource type whose provider schema can't be obtained is not taggable. CloudFormation
//! resources are checked against a fixed list of types with a `Key`/`Value` `Tags` property.
use crate::error::TagError;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Tags attribute name by terraform provider
const TERRAFORM_TAG_ATTRIBUTES: &[(&str, &str)] =
    &[("aws", "tags"), ("azurerm", "tags"), ("google", "labels")];

const CLOUDFORMATION_TAGGABLE_TYPES: &[&str] = &[
    "AWS::ApiGateway::RestApi",
    "AWS::CloudFront::Distribution",
    "AWS::CloudTrail::Trail",
    "AWS::CodeBuild::Project",
    "AWS::DynamoDB::Table",
    "AWS::EC2::EIP",
    "AWS::EC2::Instance",
    "AWS::EC2::InternetGateway",
    "AWS::EC2::NatGateway",
    "AWS::EC2::NetworkInterface",
    "AWS::EC2::RouteTable",
    "AWS::EC2::SecurityGroup",
    "AWS::EC2::Subnet",
    "AWS::EC2::VPC",
    "AWS::EC2::Volume",
    "AWS::ECR::Repository",
    "AWS::ECS::Cluster",
    "AWS::ECS::Service",
    "AWS::ECS::TaskDefinition",
    "AWS::EKS::Cluster",
    "AWS::ElastiCache::ReplicationGroup",
    "AWS::ElasticLoadBalancingV2::LoadBalancer",
    "AWS::ElasticLoadBalancingV2::TargetGroup",
    "AWS::Elasticsearch::Domain",
    "AWS::IAM::Role",
    "AWS::IAM::User",
    "AWS::KMS::Key",
    "AWS::Kinesis::Stream",
    "AWS::Lambda::Function",
    "AWS::Logs::LogGroup",
    "AWS::RDS::DBCluster",
    "AWS::RDS::DBInstance",
    "AWS::RDS::DBSubnetGroup",
    "AWS::Redshift::Cluster",
    "AWS::S3::Bucket",
    "AWS::SNS::Topic",
    "AWS::SQS::Queue",
    "AWS::SecretsManager::Secret",
    "AWS::StepFunctions::StateMachine",
];

/// `aws` for `aws_s3_bucket`
pub fn terraform_provider(resource_type: &str) -> &str {
    resource_type
        .split_once('_')
        .map(|(provider, _)| provider)
        .unwrap_or(resource_type)
}

/// Name of the tags attribute, `None` for providers without tag support
pub fn terraform_tags_attribute(resource_type: &str) -> Option<&'static str> {
    let provider = terraform_provider(resource_type);
    TERRAFORM_TAG_ATTRIBUTES
        .iter()
        .find(|(name, _)| *name == provider)
        .map(|(_, attribute)| *attribute)
}

pub fn cloudformation_is_taggable(resource_type: &str) -> bool {
    CLOUDFORMATION_TAGGABLE_TYPES.contains(&resource_type)
}

/// Where to get the terraform provider schema from
#[derive(Debug, Clone)]
pub enum SchemaSource {
    /// output of `terraform providers schema -json` stored in a file
    File(PathBuf),
    /// run `terraform providers schema -json` in this (initialized) directory
    Terraform(PathBuf),
    None,
}

/// resource type -> attribute names, by provider name
type Providers = HashMap<String, HashMap<String, HashSet<String>>>;

#[derive(serde::Deserialize)]
struct SchemaDocument {
    #[serde(default)]
    provider_schemas: HashMap<String, ProviderSchema>,
}

#[derive(serde::Deserialize)]
struct ProviderSchema {
    #[serde(default)]
    resource_schemas: HashMap<String, ResourceSchema>,
}

#[derive(serde::Deserialize)]
struct ResourceSchema {
    block: SchemaBlock,
}

#[derive(serde::Deserialize)]
struct SchemaBlock {
    #[serde(default)]
    attributes: HashMap<String, serde_json::Value>,
}

/// Terraform provider schemas, loaded on first use
pub struct TerraformSchema {
    source: SchemaSource,
    providers: Mutex<Option<Result<Providers, String>>>,
}

impl TerraformSchema {
    pub fn new(source: SchemaSource) -> Self {
        Self {
            source,
            providers: Mutex::new(None),
        }
    }

    /// Schema from an already available `terraform providers schema -json` document
    pub fn from_json(json: &str) -> Self {
        Self {
            source: SchemaSource::None,
            providers: Mutex::new(Some(parse_schema(json))),
        }
    }

    /// Whether the resource type has the tags attribute of its provider
    pub fn is_taggable(&self, resource_type: &str) -> Result<bool, TagError> {
        let unavailable = |reason: String| TagError::SchemaUnavailable {
            resource_type: resource_type.to_string(),
            reason,
        };

        let attribute = terraform_tags_attribute(resource_type)
            .ok_or_else(|| unavailable("provider does not support tags".into()))?;
        let provider = terraform_provider(resource_type);

        let mut providers = self.providers.lock();
        let providers = providers.get_or_insert_with(|| self.load());
        let providers = providers.as_ref().map_err(|reason| unavailable(reason.clone()))?;

        let resources = providers
            .get(provider)
            .ok_or_else(|| unavailable(format!("provider {provider} is not part of the schema")))?;

        Ok(resources
            .get(resource_type)
            .map_or(false, |attributes| attributes.contains(attribute)))
    }

    fn load(&self) -> Result<Providers, String> {
        match &self.source {
            SchemaSource::File(path) => {
                tracing::info!(path=%path.display(), "loading terraform provider schema");
                let json = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
                parse_schema(&json)
            }
            SchemaSource::Terraform(directory) => {
                tracing::info!(directory=%directory.display(), "running terraform providers schema");
                let output = std::process::Command::new("terraform")
                    .args(["providers", "schema", "-json"])
                    .current_dir(directory)
                    .output()
                    .map_err(|e| format!("unable to run terraform: {e}"))?;

                if !output.status.success() {
                    return Err(format!(
                        "terraform providers schema failed: {}",
                        String::from_utf8_lossy(&output.stderr).trim()
                    ));
                }

                parse_schema(&String::from_utf8_lossy(&output.stdout))
            }
            SchemaSource::None => Err("no provider schema configured".into()),
        }
    }
}

fn parse_schema(json: &str) -> Result<Providers, String> {
    let document: SchemaDocument =
        serde_json::from_str(json).map_err(|e| format!("invalid provider schema: {e}"))?;

    Ok(document
        .provider_schemas
        .into_iter()
        .map(|(address, provider)| {
            // registry.terraform.io/hashicorp/aws -> aws
            let name = address.rsplit('/').next().unwrap_or(&address).to_string();
            let resources = provider
                .resource_schemas
                .into_iter()
                .map(|(resource_type, schema)| {
                    (resource_type, schema.block.attributes.into_keys().collect())
                })
                .collect();
            (name, resources)
        })
        .collect())
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub(crate) const AWS_SCHEMA: &str = r#"{
  "format_version": "1.0",
  "provider_schemas": {
    "registry.terraform.io/hashicorp/aws": {
      "resource_schemas": {
        "aws_s3_bucket": {
          "version": 0,
          "block": {
            "attributes": {
              "bucket": { "type": "string", "optional": true },
              "tags": { "type": ["map", "string"], "optional": true }
            }
          }
        },
        "aws_iam_role_policy_attachment": {
          "version": 0,
          "block": {
            "attributes": {
              "role": { "type": "string", "required": true }
            }
          }
        }
      }
    }
  }
}"#;

    #[test]
    fn tag_attribute_by_provider() {
        assert_eq!(terraform_tags_attribute("aws_s3_bucket"), Some("tags"));
        assert_eq!(terraform_tags_attribute("azurerm_resource_group"), Some("tags"));
        assert_eq!(terraform_tags_attribute("google_storage_bucket"), Some("labels"));
        assert_eq!(terraform_tags_attribute("random_id"), None);
    }

    #[test]
    fn taggable_by_schema() {
        let schema = TerraformSchema::from_json(AWS_SCHEMA);

        assert!(schema.is_taggable("aws_s3_bucket").unwrap());
        assert!(!schema.is_taggable("aws_iam_role_policy_attachment").unwrap());
        assert!(!schema.is_taggable("aws_not_a_resource").unwrap());
        assert!(matches!(
            schema.is_taggable("google_storage_bucket"),
            Err(TagError::SchemaUnavailable { .. })
        ));
    }

    #[test]
    fn missing_schema_is_unavailable() {
        let schema = TerraformSchema::new(SchemaSource::None);
        assert!(matches!(
            schema.is_taggable("aws_s3_bucket"),
            Err(TagError::SchemaUnavailable { .. })
        ));
    }

    #[test]
    fn cloudformation_types() {
        assert!(cloudformation_is_taggable("AWS::S3::Bucket"));
        assert!(!cloudformation_is_taggable("AWS::S3::BucketPolicy"));
    }
}
