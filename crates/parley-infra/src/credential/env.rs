//! Environment variable credential source.
//!
//! The variable is read on every call. An empty value counts as signed out.

use secrecy::SecretString;

use parley_core::credential::CredentialSource;

pub struct EnvCredentialSource {
    var: String,
}

impl EnvCredentialSource {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

impl CredentialSource for EnvCredentialSource {
    fn name(&self) -> &str {
        "env"
    }

    async fn credential(&self) -> Option<SecretString> {
        match std::env::var(&self.var) {
            Ok(value) if !value.trim().is_empty() => Some(SecretString::from(value.trim().to_string())),
            Ok(_) => None,
            Err(std::env::VarError::NotPresent) => None,
            Err(std::env::VarError::NotUnicode(_)) => {
                // Credentials must be valid header text; treat as absent.
                tracing::warn!(var = %self.var, "credential variable is not valid unicode, ignored");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[tokio::test]
    async fn reads_and_trims_the_variable() {
        let var = "PARLEY_TEST_ENV_CREDENTIAL_PRESENT";
        // SAFETY: the variable name is unique to this test.
        unsafe {
            std::env::set_var(var, "  tok-env \n");
        }
        let source = EnvCredentialSource::new(var);
        let token = source.credential().await.unwrap();
        assert_eq!(token.expose_secret(), "tok-env");
        unsafe {
            std::env::remove_var(var);
        }
    }

    #[tokio::test]
    async fn missing_or_empty_variable_is_signed_out() {
        let var = "PARLEY_TEST_ENV_CREDENTIAL_EMPTY";
        let source = EnvCredentialSource::new(var);
        assert!(source.credential().await.is_none());

        // SAFETY: the variable name is unique to this test.
        unsafe {
            std::env::set_var(var, "   ");
        }
        assert!(source.credential().await.is_none());
        unsafe {
            std::env::remove_var(var);
        }
    }
}
