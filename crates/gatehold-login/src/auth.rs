//! The authentication worker.
//!
//! Runs on the worker pool once the key exchange is done. Asks the
//! authentication service about the session and applies the fallback
//! policy:
//!
//! | service says | strict           | permissive        |
//! |--------------|------------------|-------------------|
//! | verified     | verified id      | verified id       |
//! | rejected     | disconnect       | fallback identity |
//! | unavailable  | disconnect       | fallback identity |

use std::net::{IpAddr, SocketAddr};

use gatehold_protocol::Identity;

use crate::{Authenticator, LoginConfig, LoginError, Verification};

/// The address handed to the authentication service: only when proxies
/// are being prevented, and only for real socket addresses.
pub(crate) fn auth_address(config: &LoginConfig, remote: Option<SocketAddr>) -> Option<IpAddr> {
    if config.prevent_proxy_connections {
        remote.map(|addr| addr.ip())
    } else {
        None
    }
}

/// Verifies `username` against the authentication service.
///
/// Returns the identity to continue the login with, which is either the
/// verified one or (in permissive mode) the fallback for `username`.
/// A refusal comes back as [`LoginError::AuthRejected`] or
/// [`LoginError::AuthUnavailable`]; any other error is passed through
/// untouched.
pub async fn verify_identity<A: Authenticator>(
    authenticator: &A,
    config: &LoginConfig,
    username: &str,
    server_id: &str,
    address: Option<IpAddr>,
) -> Result<Identity, LoginError> {
    match authenticator.has_joined(username, server_id, address).await {
        Ok(Verification::Verified(identity)) => {
            tracing::info!("UUID of player {} is {}", identity.name, identity.canonical_id());
            Ok(identity)
        }
        Ok(Verification::Rejected) => {
            if config.permissive {
                tracing::warn!("Failed to verify username but will let them in anyway!");
                Ok(Identity::fallback(username))
            } else {
                tracing::error!("Username '{username}' tried to join with an invalid session");
                Err(LoginError::AuthRejected {
                    username: username.to_string(),
                })
            }
        }
        Err(LoginError::AuthUnavailable(reason)) => {
            if config.permissive {
                tracing::warn!("Authentication servers are down but will let them in anyway!");
                Ok(Identity::fallback(username))
            } else {
                tracing::error!(%reason, "Couldn't verify username because servers are unavailable");
                Err(LoginError::AuthUnavailable(reason))
            }
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehold_protocol::{Notice, Uuid, offline_uuid};
    use std::net::Ipv4Addr;

    enum Answer {
        Verified(Uuid),
        Rejected,
        Unavailable,
    }

    struct FixedAuthenticator(Answer);

    impl Authenticator for FixedAuthenticator {
        async fn has_joined(
            &self,
            username: &str,
            _server_id: &str,
            _address: Option<IpAddr>,
        ) -> Result<Verification, LoginError> {
            match self.0 {
                Answer::Verified(id) => Ok(Verification::Verified(Identity::verified(id, username))),
                Answer::Rejected => Ok(Verification::Rejected),
                Answer::Unavailable => Err(LoginError::AuthUnavailable("down".into())),
            }
        }
    }

    fn permissive() -> LoginConfig {
        LoginConfig {
            permissive: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_verified_identity_is_returned() {
        let id = Uuid::new_v4();
        let auth = FixedAuthenticator(Answer::Verified(id));

        let identity = verify_identity(&auth, &LoginConfig::default(), "Alice", "", None)
            .await
            .unwrap();
        assert_eq!(identity, Identity::verified(id, "Alice"));
    }

    #[tokio::test]
    async fn test_rejected_strict_is_unverified_username() {
        let auth = FixedAuthenticator(Answer::Rejected);

        let err = verify_identity(&auth, &LoginConfig::default(), "Alice", "", None)
            .await
            .unwrap_err();
        assert_eq!(err.notice(), Notice::UnverifiedUsername);
    }

    #[tokio::test]
    async fn test_rejected_permissive_falls_back() {
        let auth = FixedAuthenticator(Answer::Rejected);

        let identity = verify_identity(&auth, &permissive(), "Alice", "", None)
            .await
            .unwrap();
        assert_eq!(identity.id, Some(offline_uuid("Alice")));
        assert!(!identity.verified);
    }

    #[tokio::test]
    async fn test_unavailable_strict_is_auth_servers_down() {
        let auth = FixedAuthenticator(Answer::Unavailable);

        let err = verify_identity(&auth, &LoginConfig::default(), "Alice", "", None)
            .await
            .unwrap_err();
        assert_eq!(err.notice(), Notice::AuthServersDown);
    }

    #[tokio::test]
    async fn test_unavailable_permissive_falls_back() {
        let auth = FixedAuthenticator(Answer::Unavailable);

        let identity = verify_identity(&auth, &permissive(), "Alice", "", None)
            .await
            .unwrap();
        assert_eq!(identity, Identity::fallback("Alice"));
    }

    #[test]
    fn test_auth_address_only_with_proxy_prevention() {
        let remote = Some(SocketAddr::from((Ipv4Addr::new(10, 0, 0, 7), 25565)));
        assert_eq!(auth_address(&LoginConfig::default(), remote), None);

        let config = LoginConfig {
            prevent_proxy_connections: true,
            ..Default::default()
        };
        assert_eq!(
            auth_address(&config, remote),
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)))
        );
        assert_eq!(auth_address(&config, None), None);
    }
}
