// 用户提示接口
//
// 缓存未命中时通过 PromptCollaborator 询问用户。调用是同步的：返回时用户已做出决定，
// 取消是正常返回值而不是错误。

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use super::error::{InputRejection, SecurityError};

/// 密码提示框参数
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PasswordPrompt {
    /// 用于显示的主机地址
    pub host: String,
    /// 已知用户名，为空时需要用户输入
    pub user: String,
    /// 站点名称（可选）
    pub name: String,
    /// 服务器下发的 challenge 文本（未做显示格式化）
    pub challenge: String,
    /// 是否询问用户名
    pub ask_user: bool,
    /// 是否询问密码（交互式登录仅询问用户名时为 false）
    pub ask_password: bool,
    /// 是否显示"记住密码"选项
    pub can_remember: bool,
}

/// 密码提示框结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PasswordAnswer {
    Submitted {
        /// 用户输入的用户名（仅 ask_user 时有意义）
        user: Option<String>,
        password: String,
        remember: bool,
    },
    Cancelled,
}

/// 主密码提示框参数
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MasterPasswordPrompt {
    /// 公钥短标识
    pub key_identifier: String,
    /// 站点名称（解锁站点凭据时）
    pub name: String,
    /// 主机地址（解锁站点凭据时）
    pub host: String,
    /// 是否显示"忘记主密码"选项
    pub allow_forgotten: bool,
    /// 是否允许取消
    pub allow_cancel: bool,
    /// 是否显示"本次会话记住"选项
    pub allow_remember: bool,
}

/// 主密码提示框结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MasterPasswordAnswer {
    Password { password: String, remember: bool },
    Forgotten,
    Cancelled,
}

/// 提示协作者
/// 实现可以是阻塞对话框、发往 UI 线程的消息往返等
pub trait PromptCollaborator: Send + Sync {
    fn prompt_password(&self, prompt: &PasswordPrompt) -> Result<PasswordAnswer, SecurityError>;

    fn prompt_master_password(
        &self,
        prompt: &MasterPasswordPrompt,
    ) -> Result<MasterPasswordAnswer, SecurityError>;

    /// 告知用户输入无效（随后会重新提示）
    fn notify(&self, rejection: InputRejection);
}

/// 发往 UI 线程的提示请求
#[derive(Debug)]
pub enum PromptRequest {
    Password {
        prompt: PasswordPrompt,
        respond: oneshot::Sender<PasswordAnswer>,
    },
    MasterPassword {
        prompt: MasterPasswordPrompt,
        respond: oneshot::Sender<MasterPasswordAnswer>,
    },
    InvalidInput(InputRejection),
}

/// 基于 channel 的提示协作者
/// 请求经 mpsc 发往 UI，等待 oneshot 回复。
/// PromptCollaborator 的实现会阻塞当前线程（oneshot::Receiver::blocking_recv），
/// 在异步任务中调用会 panic：异步代码请通过 spawn_blocking 调用，或直接使用 *_async 方法。
#[derive(Clone)]
pub struct ChannelPrompt {
    requests: mpsc::UnboundedSender<PromptRequest>,
}

impl ChannelPrompt {
    /// 创建协作者，返回 UI 端的请求接收器
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PromptRequest>) {
        let (requests, rx) = mpsc::unbounded_channel();
        (Self { requests }, rx)
    }

    /// 密码提示（异步版本）
    pub async fn prompt_password_async(
        &self,
        prompt: &PasswordPrompt,
    ) -> Result<PasswordAnswer, SecurityError> {
        let response = self.send(|respond| PromptRequest::Password {
            prompt: prompt.clone(),
            respond,
        })?;
        response.await.map_err(|_| dropped())
    }

    /// 主密码提示（异步版本）
    pub async fn prompt_master_password_async(
        &self,
        prompt: &MasterPasswordPrompt,
    ) -> Result<MasterPasswordAnswer, SecurityError> {
        let response = self.send(|respond| PromptRequest::MasterPassword {
            prompt: prompt.clone(),
            respond,
        })?;
        response.await.map_err(|_| dropped())
    }

    fn send<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> PromptRequest,
    ) -> Result<oneshot::Receiver<T>, SecurityError> {
        let (respond, response) = oneshot::channel();
        self.requests
            .send(build(respond))
            .map_err(|_| SecurityError::PromptUnavailable("UI channel closed".to_string()))?;
        Ok(response)
    }
}

fn dropped() -> SecurityError {
    SecurityError::PromptUnavailable("prompt dropped without answer".to_string())
}

impl PromptCollaborator for ChannelPrompt {
    fn prompt_password(&self, prompt: &PasswordPrompt) -> Result<PasswordAnswer, SecurityError> {
        let response = self.send(|respond| PromptRequest::Password {
            prompt: prompt.clone(),
            respond,
        })?;
        response.blocking_recv().map_err(|_| dropped())
    }

    fn prompt_master_password(
        &self,
        prompt: &MasterPasswordPrompt,
    ) -> Result<MasterPasswordAnswer, SecurityError> {
        let response = self.send(|respond| PromptRequest::MasterPassword {
            prompt: prompt.clone(),
            respond,
        })?;
        response.blocking_recv().map_err(|_| dropped())
    }

    fn notify(&self, rejection: InputRejection) {
        if self.requests.send(PromptRequest::InvalidInput(rejection)).is_err() {
            warn!("[Prompt] UI channel closed, dropped notice: {}", rejection);
        }
    }
}
