use dsv_core::DsvError;
use serde::Deserialize;

/// Caller identity established by the JWT middleware.
#[derive(Debug, Clone)]
pub struct Principal {
    pub actor_id: String,
    pub roles: Vec<String>,
}

impl Principal {
    /// Construct from validated JWT claims at the server boundary.
    pub fn from_jwt_claims(claims: &JwtClaims) -> Result<Self, DsvError> {
        let actor_id = claims
            .sub
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DsvError::Unauthorized("missing sub claim".into()))?;
        Ok(Self {
            actor_id,
            roles: claims.roles.clone().unwrap_or_default(),
        })
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
    }

    pub fn require_admin(&self) -> Result<(), DsvError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(DsvError::Unauthorized(format!(
                "{} is not an admin",
                self.actor_id
            )))
        }
    }
}

/// JWT claims shape expected from the identity provider.
#[derive(Debug, Deserialize)]
pub struct JwtClaims {
    pub sub: Option<String>,
    pub roles: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_role_is_required() {
        let claims = JwtClaims {
            sub: Some("ops".into()),
            roles: Some(vec!["viewer".into()]),
        };
        let p = Principal::from_jwt_claims(&claims).unwrap();
        assert!(!p.is_admin());
        assert!(matches!(p.require_admin(), Err(DsvError::Unauthorized(_))));

        let admin = Principal {
            roles: vec!["admin".into()],
            ..p
        };
        assert!(admin.require_admin().is_ok());
    }

    #[test]
    fn missing_sub_is_rejected() {
        let claims = JwtClaims {
            sub: None,
            roles: None,
        };
        assert!(Principal::from_jwt_claims(&claims).is_err());
    }
}
