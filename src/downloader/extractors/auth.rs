// Platform login with optional second password
//
// Result codes of the login endpoint:
//   1   logged in (confirmed through the check endpoint)
//  -1   unknown id or wrong password
//  -3   account deactivated
//  -10  account blocked after abnormal logins
//  -11  second password required

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::soop::SoopSource;
use crate::downloader::errors::DownloadError;

/// Account credentials; the second password is only sent when asked for
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub second_password: Option<String>,
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(rename = "RESULT")]
    result: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    #[serde(rename = "CHANNEL")]
    channel: Option<CheckChannel>,
}

#[derive(Debug, Deserialize)]
struct CheckChannel {
    #[serde(rename = "IS_LOGIN")]
    is_login: Option<i64>,
}

const LOGGED_IN: i64 = 1;

impl SoopSource {
    /// Whether the session cookies belong to a logged-in account
    pub async fn check_auth(&self) -> bool {
        let response = match self.client.get(&self.config.check_api).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(status = %response.status(), "login check rejected");
                return false;
            }
            Err(err) => {
                debug!(error = %err, "login check failed");
                return false;
            }
        };

        match response.json::<CheckResponse>().await {
            Ok(check) => check.channel.and_then(|c| c.is_login) == Some(LOGGED_IN),
            Err(err) => {
                debug!(error = %err, "unexpected login check response");
                false
            }
        }
    }

    /// Log in, answering a second-password challenge when the account has one
    pub async fn login(&self, credentials: &Credentials) -> Result<(), DownloadError> {
        if self.check_auth().await {
            info!("already logged in");
            return Ok(());
        }

        if !credentials.is_complete() {
            return Err(DownloadError::Auth("username and password are required".to_string()));
        }

        let code = self
            .post_login(&[
                ("szWork", "login"),
                ("szType", "json"),
                ("szUid", credentials.username.as_str()),
                ("szPassword", credentials.password.as_str()),
                ("szScriptVar", "oLoginRet"),
                ("isSaveId", "false"),
                ("isSavePw", "false"),
                ("isSaveJoin", "false"),
                ("isLoginRetain", "Y"),
            ])
            .await?;

        match code {
            1 => {
                if self.check_auth().await {
                    info!(username = %credentials.username, "logged in");
                    Ok(())
                } else {
                    Err(DownloadError::Auth("login accepted but the session is not authenticated".to_string()))
                }
            }
            -1 => Err(DownloadError::Auth("unknown id or wrong password".to_string())),
            -3 => Err(DownloadError::Auth("account is deactivated".to_string())),
            -10 => Err(DownloadError::Auth(
                "account blocked after abnormal login activity".to_string(),
            )),
            -11 => self.second_login(credentials).await,
            other => Err(DownloadError::Auth(format!("login rejected (code {})", other))),
        }
    }

    async fn second_login(&self, credentials: &Credentials) -> Result<(), DownloadError> {
        let Some(second) = credentials.second_password.as_deref().filter(|p| !p.is_empty()) else {
            return Err(DownloadError::Auth(
                "account requires a second password (--second-password)".to_string(),
            ));
        };

        let code = self
            .post_login(&[
                ("szWork", "second_login"),
                ("szType", "json"),
                ("szUid", credentials.username.as_str()),
                ("szPassword", second),
                ("szScriptVar", "oLoginRet"),
                ("isSaveId", "false"),
                ("isLoginRetain", "Y"),
            ])
            .await?;

        if code == 1 {
            info!(username = %credentials.username, "logged in with second password");
            Ok(())
        } else {
            Err(DownloadError::Auth("second password rejected".to_string()))
        }
    }

    async fn post_login(&self, form: &[(&str, &str)]) -> Result<i64, DownloadError> {
        let response = self
            .client
            .post(&self.config.login_api)
            .form(form)
            .send()
            .await
            .map_err(|e| DownloadError::Auth(format!("cannot reach login server: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Auth(format!("login server returned HTTP {}", status)));
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| DownloadError::Auth(format!("unexpected login response: {}", e)))?;

        Ok(body.result.unwrap_or(1024))
    }

    /// End the platform session; failures are only logged
    pub async fn logout(&self) {
        match self.client.get(&self.config.logout_api).send().await {
            Ok(response) => debug!(status = %response.status(), "logged out"),
            Err(err) => warn!(error = %err, "logout request failed"),
        }
    }
}
