use crate::youtube::client::ApiError;

/// 远端错误是否意味着「这个 key 不能用了」（配额耗尽/授权被拒）。
///
/// 命中时调用方回报失败并换下一个 key；其他错误直接返回，不轮换。
pub trait KeyRejection {
    fn is_key_rejection(&self) -> bool;

    /// 远端给出的拒绝原因（如 `quotaExceeded`），仅用于日志。
    fn rejection_reason(&self) -> Option<&str> {
        None
    }
}

impl KeyRejection for ApiError {
    fn is_key_rejection(&self) -> bool {
        matches!(self.status(), Some(403))
    }

    fn rejection_reason(&self) -> Option<&str> {
        self.reason()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16, reason: &str) -> ApiError {
        ApiError::Http {
            status,
            message: "x".to_string(),
            reason: reason.to_string(),
        }
    }

    #[test]
    fn only_403_rotates_the_key() {
        assert!(http(403, "quotaExceeded").is_key_rejection());
        assert!(http(403, "forbidden").is_key_rejection());
        assert!(!http(400, "keyInvalid").is_key_rejection());
        assert!(!http(429, "").is_key_rejection());
        assert!(!http(500, "backendError").is_key_rejection());
    }

    #[test]
    fn rejection_reason_comes_from_error_body() {
        assert_eq!(
            http(403, "quotaExceeded").rejection_reason(),
            Some("quotaExceeded")
        );
        assert_eq!(http(403, "").rejection_reason(), None);
    }

    #[test]
    fn decode_errors_do_not_rotate() {
        let err: ApiError = sonic_rs::from_str::<u32>("\"x\"").unwrap_err().into();
        assert!(!err.is_key_rejection());
    }
}
