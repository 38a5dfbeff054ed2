// 测试辅助：脚本化提示协作者、证书生成

use std::collections::VecDeque;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use super::config::KdfConfig;
use super::crypto::PrivateKey;
use super::error::{InputRejection, SecurityError};
use super::prompt::{
    MasterPasswordAnswer, MasterPasswordPrompt, PasswordAnswer, PasswordPrompt,
    PromptCollaborator,
};

/// 初始化测试日志输出（重复调用无副作用）
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// 测试用的低迭代次数
pub fn fast_kdf() -> KdfConfig {
    KdfConfig { iterations: 16 }
}

pub fn master_key(password: &str) -> PrivateKey {
    PrivateKey::generate_from_password(password, &fast_kdf()).expect("derive master key")
}

/// 生成带指定 SAN 的自签名证书（每次调用密钥不同，DER 字节也不同）
pub fn cert_with_sans(names: &[&str]) -> Vec<u8> {
    let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    let certified = rcgen::generate_simple_self_signed(names).expect("generate certificate");
    certified.cert.der().to_vec()
}

#[derive(Default)]
struct Script {
    passwords: VecDeque<PasswordAnswer>,
    masters: VecDeque<MasterPasswordAnswer>,
    password_prompts: Vec<PasswordPrompt>,
    master_prompts: Vec<MasterPasswordPrompt>,
    notices: Vec<InputRejection>,
}

/// 按预设顺序回答的提示协作者，脚本耗尽时返回 PromptUnavailable
#[derive(Default)]
pub struct ScriptedPrompt {
    script: Mutex<Script>,
    delay: Option<Duration>,
}

impl ScriptedPrompt {
    pub fn new() -> Self {
        init_tracing();
        Self::default()
    }

    pub fn passwords(self, answers: Vec<PasswordAnswer>) -> Self {
        self.script.lock().unwrap().passwords.extend(answers);
        self
    }

    pub fn master(self, answers: Vec<MasterPasswordAnswer>) -> Self {
        self.script.lock().unwrap().masters.extend(answers);
        self
    }

    /// 每次提示前等待，用于并发测试
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn password_prompts(&self) -> Vec<PasswordPrompt> {
        self.script.lock().unwrap().password_prompts.clone()
    }

    pub fn master_prompts(&self) -> usize {
        self.script.lock().unwrap().master_prompts.len()
    }

    pub fn last_master_prompt(&self) -> Option<MasterPasswordPrompt> {
        self.script.lock().unwrap().master_prompts.last().cloned()
    }

    pub fn notices(&self) -> Vec<InputRejection> {
        self.script.lock().unwrap().notices.clone()
    }

    fn pause(&self) {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
    }
}

impl PromptCollaborator for ScriptedPrompt {
    fn prompt_password(&self, prompt: &PasswordPrompt) -> Result<PasswordAnswer, SecurityError> {
        let answer = {
            let mut script = self.script.lock().unwrap();
            script.password_prompts.push(prompt.clone());
            script.passwords.pop_front()
        };
        self.pause();
        answer.ok_or_else(|| SecurityError::PromptUnavailable("script exhausted".to_string()))
    }

    fn prompt_master_password(
        &self,
        prompt: &MasterPasswordPrompt,
    ) -> Result<MasterPasswordAnswer, SecurityError> {
        let answer = {
            let mut script = self.script.lock().unwrap();
            script.master_prompts.push(prompt.clone());
            script.masters.pop_front()
        };
        self.pause();
        answer.ok_or_else(|| SecurityError::PromptUnavailable("script exhausted".to_string()))
    }

    fn notify(&self, rejection: InputRejection) {
        self.script.lock().unwrap().notices.push(rejection);
    }
}
