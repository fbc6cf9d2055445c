//! Phone-code login, with the cloud-password (2FA) step when the account
//! has one.

use std::future::Future;

use tgmedia_tl::{enums, functions, types};
use tracing::info;

use crate::Client;
use crate::errors::{InvocationError, LoginError};
use crate::two_factor_auth::calculate_2fa;

/// Login context returned by [`LoginFlow::request_login_code`] and passed
/// back to [`LoginFlow::complete_login`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoginToken {
    pub phone:           String,
    pub phone_code_hash: String,
}

/// Account login.
pub trait LoginFlow {
    /// Ask the server to send a login code to `phone`.
    ///
    /// The number is validated locally first: `+` is optional, then 2 to 15
    /// digits not starting with `0`.
    fn request_login_code(&self, phone: &str)
        -> impl Future<Output = Result<LoginToken, LoginError>> + Send;

    /// Finish the login started by `request_login_code`.
    ///
    /// `password` is only used when the account has a cloud password.
    fn complete_login(
        &self,
        token:    &LoginToken,
        code:     &str,
        password: Option<&str>,
    ) -> impl Future<Output = Result<types::User, LoginError>> + Send;
}

/// Trimmed phone number, or `None` if it does not look like E.164.
pub fn normalize_phone(phone: &str) -> Option<&str> {
    let phone = phone.trim();
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    let valid = (2..=15).contains(&digits.len())
        && digits.bytes().all(|b| b.is_ascii_digit())
        && !digits.starts_with('0');
    valid.then_some(phone)
}

impl LoginFlow for Client {
    async fn request_login_code(&self, phone: &str) -> Result<LoginToken, LoginError> {
        let phone = normalize_phone(phone)
            .ok_or_else(|| LoginError::InvalidPhoneFormat(phone.to_string()))?
            .to_string();

        let req = functions::auth::SendCode {
            phone_number: phone.clone(),
            api_id:       self.inner.config.api_id,
            api_hash:     self.inner.config.api_hash.clone(),
        };
        let sent = match self.invoke(&req).await {
            Ok(s) => s,
            Err(e) if e.is("PHONE_NUMBER_INVALID") => return Err(LoginError::InvalidPhoneFormat(phone)),
            Err(e) => return Err(e.into()),
        };
        info!("[tgmedia] Login code sent");
        Ok(LoginToken { phone, phone_code_hash: sent.phone_code_hash })
    }

    async fn complete_login(
        &self,
        token:    &LoginToken,
        code:     &str,
        password: Option<&str>,
    ) -> Result<types::User, LoginError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(LoginError::InvalidCode);
        }
        // A blank password counts as none.
        let password = password.filter(|p| !p.trim().is_empty());

        let req = functions::auth::SignIn {
            phone_number:    token.phone.clone(),
            phone_code_hash: token.phone_code_hash.clone(),
            phone_code:      code.to_string(),
        };
        let auth = match self.invoke(&req).await {
            Ok(a) => a,
            Err(e) if e.is("SESSION_PASSWORD_NEEDED") => match password {
                Some(pw) => self.check_password(pw).await?,
                None => {
                    let hint = self
                        .invoke(&functions::account::GetPassword {})
                        .await
                        .map(|p| p.hint)
                        .unwrap_or_default();
                    return Err(LoginError::TwoFactorRequired { hint });
                }
            },
            Err(e) if e.is("PHONE_CODE_*") => return Err(LoginError::InvalidCode),
            Err(e) => return Err(e.into()),
        };

        let user = match auth {
            enums::auth::Authorization::Authorization(a) => a.user,
            enums::auth::Authorization::SignUpRequired(_) => return Err(LoginError::SignUpRequired),
        };
        let enums::User::User(user) = user else {
            return Err(InvocationError::Deserialize("authorization carried an empty user".into()).into());
        };

        self.save_session().await?;
        info!("[tgmedia] Signed in ✓  Welcome, {}!", user.first_name);
        Ok(user)
    }
}

impl Client {
    async fn check_password(&self, password: &str) -> Result<enums::auth::Authorization, LoginError> {
        let info = self.invoke(&functions::account::GetPassword {}).await?;
        if !info.has_password {
            return Err(InvocationError::Deserialize("server asked for a password but none is set".into()).into());
        }
        let enums::PasswordKdfAlgo::ModPow(algo) = info.current_algo else {
            return Err(InvocationError::Deserialize("unsupported password algorithm".into()).into());
        };

        let mut a = [0u8; 256];
        getrandom::getrandom(&mut a).map_err(InvocationError::from)?;

        let password = password.as_bytes().to_vec();
        let srp_b = info.srp_b;
        let (m1, g_a) = tokio::task::spawn_blocking(move || {
            calculate_2fa(&algo.salt1, &algo.salt2, &algo.p, algo.g, &srp_b, &a, password)
        })
        .await
        .map_err(|e| InvocationError::Deserialize(format!("SRP worker: {e}")))?
        .map_err(|e| InvocationError::Deserialize(e.to_string()))?;

        let req = functions::auth::CheckPassword {
            password: types::InputCheckPasswordSrp { srp_id: info.srp_id, a: g_a.to_vec(), m1: m1.to_vec() },
        };
        match self.invoke(&req).await {
            Ok(auth) => {
                info!("[tgmedia] 2FA ✓");
                Ok(auth)
            }
            Err(e) if e.is("PASSWORD_HASH_INVALID") => Err(LoginError::InvalidPassword),
            Err(e) => Err(e.into()),
        }
    }
}
