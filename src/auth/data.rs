use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identities: Option<Vec<serde_json::Value>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub user: AuthUser,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SignUpOutcome {
    SignedIn { user: AuthUser },
    ConfirmationRequired,
    AlreadyRegistered,
}

#[derive(Deserialize, Debug)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub redirect_to: Option<String>,
}

/// Error body shapes the auth service answers with.
#[derive(Deserialize, Debug, Default)]
struct AuthErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid login credentials")]
    InvalidCredentials,

    #[error("email not confirmed")]
    EmailNotConfirmed,

    #[error("user already registered")]
    AlreadyRegistered,

    #[error("password too short")]
    PasswordTooShort,

    #[error("too many requests")]
    RateLimited,

    #[error("email is required")]
    MissingEmail,

    #[error("auth service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl AuthError {
    pub fn from_response(status: u16, body: &str) -> AuthError {
        let parsed: AuthErrorBody = serde_json::from_str(body).unwrap_or_default();
        let message = parsed
            .error_description
            .or(parsed.msg)
            .or(parsed.message)
            .or(parsed.error)
            .unwrap_or_else(|| body.trim().to_string());

        AuthError::classify(status, &message)
    }

    pub fn classify(status: u16, message: &str) -> AuthError {
        let lowered = message.to_lowercase();

        if status == 429
            || message.contains("429")
            || lowered.contains("too many requests")
            || lowered.contains("rate limit")
        {
            AuthError::RateLimited
        } else if message.contains("Invalid login credentials") {
            AuthError::InvalidCredentials
        } else if message.contains("Email not confirmed") {
            AuthError::EmailNotConfirmed
        } else if message.contains("User already registered") {
            AuthError::AlreadyRegistered
        } else if message.contains("Password should be at least") {
            AuthError::PasswordTooShort
        } else {
            AuthError::Rejected {
                status,
                message: message.to_string(),
            }
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            AuthError::InvalidCredentials => "Email ou senha incorretos".to_string(),
            AuthError::EmailNotConfirmed => {
                "Email não confirmado. Verifique sua caixa de entrada.".to_string()
            }
            AuthError::AlreadyRegistered => {
                "Este email já está cadastrado. Tente fazer login.".to_string()
            }
            AuthError::PasswordTooShort => "A senha deve ter pelo menos 6 caracteres".to_string(),
            AuthError::RateLimited => {
                "Muitas tentativas. Aguarde 5-10 minutos e tente novamente.".to_string()
            }
            AuthError::MissingEmail => "Digite seu email primeiro".to_string(),
            AuthError::Rejected { message, .. } if !message.is_empty() => message.clone(),
            AuthError::Rejected { .. } => "Erro ao autenticar".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_messages() {
        assert_eq!(
            AuthError::from_response(
                400,
                r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#
            ),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            AuthError::from_response(400, r#"{"code":400,"msg":"Email not confirmed"}"#),
            AuthError::EmailNotConfirmed
        );
        assert_eq!(
            AuthError::from_response(422, r#"{"msg":"User already registered"}"#),
            AuthError::AlreadyRegistered
        );
        assert_eq!(
            AuthError::from_response(
                422,
                r#"{"msg":"Password should be at least 6 characters"}"#
            ),
            AuthError::PasswordTooShort
        );
    }

    #[test]
    fn rate_limits_by_status_or_text() {
        assert_eq!(AuthError::from_response(429, ""), AuthError::RateLimited);
        assert_eq!(
            AuthError::classify(400, "Email rate limit exceeded"),
            AuthError::RateLimited
        );
        assert_eq!(
            AuthError::classify(400, "Too Many Requests"),
            AuthError::RateLimited
        );
    }

    #[test]
    fn unknown_errors_keep_backend_message() {
        let error = AuthError::from_response(500, "upstream exploded");
        assert_eq!(error.user_message(), "upstream exploded");

        let error = AuthError::from_response(500, "");
        assert_eq!(error.user_message(), "Erro ao autenticar");
    }

    #[test]
    fn sign_up_outcome_is_tagged() {
        let value = serde_json::to_value(SignUpOutcome::ConfirmationRequired).unwrap();
        assert_eq!(value["outcome"], "confirmation_required");
    }
}
