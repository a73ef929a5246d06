//! User signup.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::coordinator::{TransactionContext, TransactionCoordinator};
use crate::error::{DuplicateError, StorageResult, TransactionResult, ValidationError};
use crate::response::ErrorCode;
use crate::types::{DocumentWrite, ExecutionMode, TransactionId, UniquenessConstraint};

use super::{CodeMap, USERS, WorkflowFailure, decode_upload, required};

const CODES: CodeMap = CodeMap {
    generic: ErrorCode::SignupError,
    duplicate: duplicate_code,
};

fn duplicate_code(dup: &DuplicateError) -> ErrorCode {
    if dup.field == "email" {
        ErrorCode::DuplicateEmail
    } else {
        ErrorCode::DuplicateUser
    }
}

/// Inbound signup request.
///
/// `avatar` and `qrCode` are optional base64 payloads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
    pub qr_code: Option<String>,
}

/// Result of a committed signup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupOutcome {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code_key: Option<String>,
    pub transaction_id: TransactionId,
    pub mode: ExecutionMode,
}

#[derive(Debug)]
struct ValidSignup {
    user_id: String,
    email: String,
    display_name: String,
    avatar: Option<Vec<u8>>,
    qr_code: Option<Vec<u8>>,
}

impl SignupRequest {
    fn validate(&self) -> StorageResult<ValidSignup> {
        let user_id = required("userId", self.user_id.as_deref())?;
        let email = required("email", self.email.as_deref())?.to_lowercase();
        let display_name = required("displayName", self.display_name.as_deref())?;

        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => {
                return Err(ValidationError::InvalidField {
                    field: "email".to_string(),
                    message: format!("'{}' is not an email address", email),
                }
                .into());
            }
        }

        Ok(ValidSignup {
            user_id,
            email,
            display_name,
            avatar: decode_upload("avatar", self.avatar.as_deref())?,
            qr_code: decode_upload("qrCode", self.qr_code.as_deref())?,
        })
    }
}

/// Creates a user together with their uploaded profile media.
///
/// Emails are compared case-insensitively. A repeated request fails with
/// `DUPLICATE_EMAIL` (or `DUPLICATE_USER` when only the id collides) and its
/// uploads are deleted; uploads use per-attempt keys so a retry never
/// overwrites the media of a committed user.
#[derive(Debug, Clone)]
pub struct SignupWorkflow {
    coordinator: TransactionCoordinator,
}

impl SignupWorkflow {
    pub fn new(coordinator: TransactionCoordinator) -> Self {
        Self { coordinator }
    }

    pub async fn execute(&self, request: &SignupRequest) -> Result<SignupOutcome, WorkflowFailure> {
        let signup = request.validate().map_err(|e| CODES.reject(e))?;
        let mut ctx = self
            .coordinator
            .begin(None)
            .await
            .map_err(|e| CODES.reject(e))?;

        let remaining = ctx.remaining();
        let result = match tokio::time::timeout(remaining, self.run(&mut ctx, &signup)).await {
            Ok(result) => result,
            Err(_) => Err(self.coordinator.expire(&mut ctx).await),
        };
        result.map_err(|f| CODES.fail(f))
    }

    async fn run(
        &self,
        ctx: &mut TransactionContext,
        signup: &ValidSignup,
    ) -> TransactionResult<SignupOutcome> {
        let buckets = &self.coordinator.config().buckets;
        let attempt = Uuid::new_v4();

        let mut avatar_key = None;
        if let Some(bytes) = &signup.avatar {
            let key = format!("users/{}/{}/avatar", signup.user_id, attempt);
            self.coordinator
                .upload(ctx, &buckets.avatars, &key, bytes.clone())
                .await?;
            avatar_key = Some(key);
        }

        let mut qr_code_key = None;
        if let Some(bytes) = &signup.qr_code {
            let key = format!("users/{}/{}/qr", signup.user_id, attempt);
            self.coordinator
                .upload(ctx, &buckets.qr_codes, &key, bytes.clone())
                .await?;
            qr_code_key = Some(key);
        }

        let user = json!({
            "userId": signup.user_id,
            "email": signup.email,
            "displayName": signup.display_name,
            "avatarKey": avatar_key,
            "qrCodeKey": qr_code_key,
            "createdAt": Utc::now().to_rfc3339(),
        });
        // Email first so a repeated request reports DUPLICATE_EMAIL
        let write = DocumentWrite::create(USERS, &signup.user_id, user)
            .with_constraint(UniquenessConstraint::field(USERS, "email", &signup.email))
            .with_constraint(UniquenessConstraint::document_id(USERS, &signup.user_id));
        self.coordinator.stage(ctx, write).await?;
        debug!(transaction_id = %ctx.id(), user_id = %signup.user_id, "User staged");

        let receipt = self.coordinator.commit(ctx).await?;
        info!(
            transaction_id = %receipt.transaction_id,
            user_id = %signup.user_id,
            "Signup committed"
        );

        Ok(SignupOutcome {
            user_id: signup.user_id.clone(),
            email: signup.email.clone(),
            display_name: signup.display_name.clone(),
            avatar_key,
            qr_code_key,
            transaction_id: receipt.transaction_id,
            mode: receipt.mode,
        })
    }
}
