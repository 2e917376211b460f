//! 命令编解码
//!
//! 命令以可逆的base64形式存储和传递（非加密），保存/编辑时编码，分发前解码。

use base64::{engine::general_purpose, Engine as _};

use crate::{SchedulerError, SchedulerResult};

pub fn encode_command(command: &str) -> String {
    general_purpose::STANDARD.encode(command.as_bytes())
}

pub fn decode_command(encoded: &str) -> SchedulerResult<String> {
    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| SchedulerError::Codec(format!("命令解码失败: {e}")))?;
    String::from_utf8(bytes).map_err(|e| SchedulerError::Codec(format!("命令不是有效的UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_command() {
        let command = "tar -czf /backup/$(date +%F).tgz /data && echo 完成";
        let encoded = encode_command(command);
        assert_ne!(encoded, command);
        assert_eq!(decode_command(&encoded).unwrap(), command);
    }

    #[test]
    fn test_decode_invalid_command() {
        let err = decode_command("not base64!").unwrap_err();
        assert!(matches!(err, SchedulerError::Codec(_)));
    }
}
