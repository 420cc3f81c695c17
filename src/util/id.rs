use uuid::Uuid;

/// 请求 ID，用于日志关联。
pub fn request_id() -> String {
    let s = Uuid::new_v4().simple().to_string();
    format!("req-{}", &s[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_prefixed_and_short() {
        let id = request_id();
        assert!(id.starts_with("req-"));
        assert_eq!(id.len(), 16);
        assert_ne!(id, request_id());
    }
}
