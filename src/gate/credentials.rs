//! 服务端密钥、密码哈希的读取与校验

use crate::error::GateError;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString},
    Algorithm, Argon2, Params, Version,
};
use secrecy::{ExposeSecret, SecretString};

/// 凭据来源，每次登录提交时读取
pub trait CredentialSource: Send + Sync {
    /// 服务端密钥；未设置或为空白时返回 None
    fn secret(&self) -> Option<SecretString>;

    /// 已保存的密码哈希；未设置或为空白时返回 None
    fn password_hash(&self) -> Option<String>;
}

/// 从进程环境变量读取凭据
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    secret_var: String,
    hash_var: String,
}

impl EnvCredentials {
    pub fn new(secret_var: impl Into<String>, hash_var: impl Into<String>) -> Self {
        Self {
            secret_var: secret_var.into(),
            hash_var: hash_var.into(),
        }
    }

    /// 密钥变量名中第一个 `_` 之前的部分，如 `KEYSTATIC_SECRET` 的 `KEYSTATIC`
    fn env_prefix(&self) -> &str {
        self.secret_var
            .split_once('_')
            .map_or(self.secret_var.as_str(), |(prefix, _)| prefix)
    }

    /// 与密钥变量同前缀的环境变量名（只列名字，不含值），排序后返回
    fn related_env_vars(&self) -> Vec<String> {
        let prefix = self.env_prefix();
        let mut names = std::env::vars_os()
            .filter_map(|(k, _)| k.into_string().ok())
            .filter(|k| k.starts_with(prefix))
            .collect::<Vec<_>>();
        names.sort();
        names
    }
}

fn non_blank_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl CredentialSource for EnvCredentials {
    fn secret(&self) -> Option<SecretString> {
        let secret = non_blank_env(&self.secret_var);
        if secret.is_none() {
            let related = self.related_env_vars();
            let related = if related.is_empty() {
                "none".to_string()
            } else {
                related.join(", ")
            };
            tracing::error!(
                "{} 未设置或为空，当前存在的 {}* 环境变量: {}",
                self.secret_var,
                self.env_prefix(),
                related
            );
        }
        secret.map(SecretString::from)
    }

    fn password_hash(&self) -> Option<String> {
        non_blank_env(&self.hash_var).map(|v| v.trim().to_string())
    }
}

/// 哈希输入：密码与服务端密钥拼接
fn hash_material(password: &str, secret: &SecretString) -> String {
    let mut material = String::with_capacity(password.len() + secret.expose_secret().len());
    material.push_str(password);
    material.push_str(secret.expose_secret());
    material
}

/// 已保存哈希的校验结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Match,
    Mismatch,
    /// 哈希字符串无法解析，属于配置错误
    MalformedHash,
}

/// Argon2id 哈希，计算放在阻塞线程池中执行
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    params: Params,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self {
            params: Self::default_params(),
        }
    }
}

impl CredentialHasher {
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    fn default_params() -> Params {
        Params::new(12288, 3, 1, None).unwrap_or_default()
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// 生成 `password + secret` 的 PHC 格式哈希
    pub async fn hash(&self, password: &str, secret: &SecretString) -> Result<String, GateError> {
        let material = hash_material(password, secret);
        let argon2 = self.argon2();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(material.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| GateError::Hash(e.to_string()))
        })
        .await?
    }

    /// 校验 `password + secret` 是否与保存的哈希一致（常量时间比较）
    pub async fn verify(
        &self,
        password: &str,
        secret: &SecretString,
        stored_hash: &str,
    ) -> Result<Verification, GateError> {
        let material = hash_material(password, secret);
        let stored_hash = stored_hash.to_string();
        let argon2 = self.argon2();
        let verification = tokio::task::spawn_blocking(move || {
            let Ok(parsed) = PasswordHash::new(&stored_hash) else {
                return Verification::MalformedHash;
            };
            match argon2.verify_password(material.as_bytes(), &parsed) {
                Ok(()) => Verification::Match,
                Err(_) => Verification::Mismatch,
            }
        })
        .await?;
        Ok(verification)
    }
}

/// 供命令行工具使用的同步哈希
pub fn hash_blocking(password: &str, secret: &SecretString) -> Result<String, GateError> {
    let material = hash_material(password, secret);
    let salt = SaltString::generate(&mut OsRng);
    CredentialHasher::default()
        .argon2()
        .hash_password(material.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| GateError::Hash(e.to_string()))
}
