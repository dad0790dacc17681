use percent_encoding::percent_decode_str;

/// 请求路径无法规范化
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("路径编码无效")]
    InvalidEncoding,
    #[error("路径包含 ..")]
    ParentSegment,
}

/// 按静态文件服务的方式规范化请求路径
///
/// 先整体百分号解码，再去掉空段和 `.` 段；`..` 段直接拒绝。
/// 结果总以 `/` 开头，且不带结尾的 `/`。
pub fn normalize_path(raw: &str) -> Result<String, PathError> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| PathError::InvalidEncoding)?;

    let mut normalized = String::with_capacity(decoded.len() + 1);
    for segment in decoded.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(PathError::ParentSegment),
            _ => {
                normalized.push('/');
                normalized.push_str(segment);
            }
        }
    }

    if normalized.is_empty() {
        normalized.push('/');
    }
    Ok(normalized)
}
