use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

/// 仪表盘会话令牌
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // username
    pub cid: String, // 登录时的客户端/设备标识
    pub exp: i64,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl JwtService {
    pub fn new(secret: &str, ttl_seconds: u64) -> anyhow::Result<Self> {
        let ttl = i64::try_from(ttl_seconds)
            .ok()
            .filter(|ttl| *ttl > 0)
            .and_then(Duration::try_seconds)
            .ok_or_else(|| anyhow::anyhow!("token_ttl_seconds 必须大于 0 且不能溢出"))?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        })
    }

    pub fn issue(&self, username: &str, client_id: &str) -> anyhow::Result<String> {
        let exp = Utc::now()
            .checked_add_signed(self.ttl)
            .ok_or_else(|| anyhow::anyhow!("时间计算溢出"))?
            .timestamp();

        let claims = Claims {
            sub: username.to_string(),
            cid: client_id.to_string(),
            exp,
        };

        Ok(encode(&Header::new(JWT_ALGORITHM), &claims, &self.encoding_key)?)
    }

    /// 校验签名与过期时间
    pub fn validate(&self, token: &str) -> anyhow::Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::new(JWT_ALGORITHM))?;
        Ok(data.claims)
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl.num_seconds().unsigned_abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_validate() {
        let jwt = JwtService::new("test-secret", 3600).unwrap();
        let token = jwt.issue("sauna", "wall-panel").unwrap();

        let claims = jwt.validate(&token).unwrap();
        assert_eq!(claims.sub, "sauna");
        assert_eq!(claims.cid, "wall-panel");
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = JwtService::new("secret-a", 3600).unwrap().issue("sauna", "default").unwrap();
        assert!(JwtService::new("secret-b", 3600).unwrap().validate(&token).is_err());
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        assert!(JwtService::new("secret", 0).is_err());
    }
}
