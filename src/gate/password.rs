//! 密码格式规则
//!
//! 只检查格式，不涉及哈希比对。按固定顺序返回第一条未满足的规则。

/// 最短密码长度
pub const PASSWORD_MIN_LENGTH: usize = 8;

/// 未满足的格式规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatViolation {
    TooShort,
    MissingLowercase,
    MissingUppercase,
    MissingDigit,
    MissingSymbol,
}

impl FormatViolation {
    /// 登录页上展示的提示（荷兰语）
    pub fn message(self) -> &'static str {
        match self {
            FormatViolation::TooShort => "Wachtwoord moet minimaal 8 tekens lang zijn",
            FormatViolation::MissingLowercase => {
                "Wachtwoord moet minimaal één kleine letter bevatten"
            }
            FormatViolation::MissingUppercase => "Wachtwoord moet minimaal één hoofdletter bevatten",
            FormatViolation::MissingDigit => "Wachtwoord moet minimaal één cijfer bevatten",
            FormatViolation::MissingSymbol => "Wachtwoord moet minimaal één symbool bevatten",
        }
    }

    /// 命令行工具使用的英文提示
    pub fn operator_message(self) -> &'static str {
        match self {
            FormatViolation::TooShort => "Password must be at least 8 characters",
            FormatViolation::MissingLowercase => "Password must contain at least one lowercase letter",
            FormatViolation::MissingUppercase => "Password must contain at least one uppercase letter",
            FormatViolation::MissingDigit => "Password must contain at least one number",
            FormatViolation::MissingSymbol => "Password must contain at least one symbol",
        }
    }
}

impl std::fmt::Display for FormatViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// 校验密码格式
///
/// 长度按字符计；“符号”指 ASCII 字母和数字以外的任何字符。
pub fn validate_format(password: &str) -> Result<(), FormatViolation> {
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        return Err(FormatViolation::TooShort);
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(FormatViolation::MissingLowercase);
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(FormatViolation::MissingUppercase);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(FormatViolation::MissingDigit);
    }
    if !password.chars().any(|c| !c.is_ascii_alphanumeric()) {
        return Err(FormatViolation::MissingSymbol);
    }
    Ok(())
}
