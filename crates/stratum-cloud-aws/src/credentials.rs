//! SES SMTP credential set provider
//!
//! Each request gets its own IAM user allowed to send through SES. The
//! user's access key is turned into an SMTP password; since IAM hands out a
//! key's secret only once, the password is read back from the request's
//! published output, and a key whose password was lost is replaced.

use crate::api::AwsClients;
use crate::config::{SmtpStrategyConfig, ses_smtp_endpoint};
use crate::error::AwsError;
use crate::postgres::AWS_STRATEGY;
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use stratum_cloud::naming::{DEFAULT_IDENTIFIER_LENGTH, infra_name};
use stratum_cloud::{
    CreateOutcome, DeleteOutcome, ProvisionContext, ProvisionedInstance, ReconcileIntervals,
    ResourceProvider, ResourceStatus, Result,
};
use tracing::info;

pub const PROVIDER_NAME: &str = "aws-ses-smtp";

/// Inline policy attached to every credential set user
pub const SEND_POLICY_NAME: &str = "ses-send";

const OUTPUT_USERNAME: &str = "username";
const OUTPUT_PASSWORD: &str = "password";

type HmacSha256 = Hmac<Sha256>;

const SMTP_SIGNING_DATE: &str = "11111111";
const SMTP_SIGNING_SERVICE: &str = "ses";
const SMTP_SIGNING_TERMINAL: &str = "aws4_request";
const SMTP_SIGNING_MESSAGE: &str = "SendRawEmail";
const SMTP_PASSWORD_VERSION: u8 = 0x04;

/// SES SMTP password for an IAM secret access key in `region`
pub fn smtp_password(secret_access_key: &str, region: &str) -> crate::error::Result<String> {
    let key = format!("AWS4{}", secret_access_key);
    let mut signature = sign(key.as_bytes(), SMTP_SIGNING_DATE)?;
    for part in [
        region,
        SMTP_SIGNING_SERVICE,
        SMTP_SIGNING_TERMINAL,
        SMTP_SIGNING_MESSAGE,
    ] {
        signature = sign(&signature, part)?;
    }

    let mut versioned = Vec::with_capacity(signature.len() + 1);
    versioned.push(SMTP_PASSWORD_VERSION);
    versioned.extend_from_slice(&signature);
    Ok(BASE64.encode(versioned))
}

fn sign(key: &[u8], message: &str) -> crate::error::Result<Vec<u8>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| AwsError::SmtpPassword(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn send_policy() -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Action": "ses:SendRawEmail",
            "Resource": "*"
        }]
    })
    .to_string()
}

pub struct AwsSmtpCredentialProvider {
    clients: Arc<dyn AwsClients>,
    name_prefix: String,
    intervals: ReconcileIntervals,
}

impl AwsSmtpCredentialProvider {
    pub fn new(clients: Arc<dyn AwsClients>) -> Self {
        Self {
            clients,
            name_prefix: "stratum".to_string(),
            intervals: ReconcileIntervals::default(),
        }
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn with_intervals(mut self, intervals: ReconcileIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    fn user_name(&self, ctx: &ProvisionContext<'_>) -> String {
        ctx.status.external_id.clone().unwrap_or_else(|| {
            infra_name(&self.name_prefix, &ctx.request.name, DEFAULT_IDENTIFIER_LENGTH)
        })
    }
}

#[async_trait]
impl ResourceProvider for AwsSmtpCredentialProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports_strategy(&self, strategy: &str) -> bool {
        strategy == AWS_STRATEGY
    }

    fn reconcile_interval(&self, status: &ResourceStatus) -> Duration {
        self.intervals.for_status(status)
    }

    async fn create(&self, ctx: &ProvisionContext<'_>) -> Result<CreateOutcome> {
        let smtp: SmtpStrategyConfig = ctx.config.provider_config()?;
        let region = &ctx.config.region;
        let host = match smtp.host {
            Some(host) => host,
            None => ses_smtp_endpoint(region)
                .ok_or_else(|| AwsError::UnsupportedSmtpRegion(region.clone()))?
                .to_string(),
        };

        let user = self.user_name(ctx);
        let iam = self.clients.iam(region).await?;
        if !iam.user_exists(&user).await? {
            info!(user = %user, "Creating IAM user for SMTP credentials");
            iam.create_user(&user).await?;
        }
        iam.put_user_policy(&user, SEND_POLICY_NAME, &send_policy())
            .await?;

        let keys = iam.list_access_keys(&user).await?;
        let published = ctx.published.and_then(|output| {
            let username = output.get(OUTPUT_USERNAME)?;
            let password = output.get(OUTPUT_PASSWORD)?;
            keys.contains(username)
                .then(|| (username.clone(), password.clone()))
        });

        let (username, password) = match published {
            Some(credentials) => credentials,
            None => {
                for key in &keys {
                    info!(user = %user, key = %key, "Deleting access key without a known secret");
                    iam.delete_access_key(&user, key).await?;
                }
                let key = iam.create_access_key(&user).await?;
                info!(user = %user, key = %key.id, "Created SMTP access key");
                let password = smtp_password(&key.secret, region)?;
                (key.id, password)
            }
        };

        let instance = ProvisionedInstance::new(&user)
            .with_output("host", host)
            .with_output("port", smtp.port.to_string())
            .with_output(OUTPUT_USERNAME, username)
            .with_output(OUTPUT_PASSWORD, password);
        Ok(CreateOutcome::ready(instance, "credentials available"))
    }

    async fn delete(&self, ctx: &ProvisionContext<'_>) -> Result<DeleteOutcome> {
        let user = self.user_name(ctx);
        let iam = self.clients.iam(&ctx.config.region).await?;
        if !iam.user_exists(&user).await? {
            return Ok(DeleteOutcome::gone("credentials deleted"));
        }

        for key in iam.list_access_keys(&user).await? {
            iam.delete_access_key(&user, &key).await?;
        }
        iam.delete_user_policy(&user, SEND_POLICY_NAME).await?;
        info!(user = %user, "Deleting IAM user");
        iam.delete_user(&user).await?;
        Ok(DeleteOutcome::gone("credentials deleted"))
    }
}
