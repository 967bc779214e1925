//! Typed helpers for the handful of commands the bot speaks.
//!
//! Helpers that only perform an action return the raw [`Response`] so the
//! caller can branch on its status. Helpers that must produce a typed value
//! turn a non-zero status into [`QueryError::Command`].

use crate::channel::CommandChannel;
use crate::codec::{Command, Response};
use crate::error::{QueryError, Result};
use crate::event::TargetMode;
use crate::model::{Client, ClientInfo, ServerInfo, WhoAmI};

/// `reasonid` for removing a client from the whole server.
pub const KICK_FROM_SERVER: u8 = 5;

impl CommandChannel {
    /// `login`; a non-zero status becomes [`QueryError::AuthFailed`].
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let response = self
            .send(
                &Command::new("login")
                    .arg("client_login_name", username)
                    .arg("client_login_password", password),
            )
            .await?;
        if response.is_ok() {
            Ok(())
        } else {
            Err(QueryError::AuthFailed(response.status))
        }
    }

    /// Bind the session to a virtual server.
    pub async fn use_server(&self, server_id: u64) -> Result<()> {
        self.send(&Command::new("use").arg("sid", server_id))
            .await?
            .into_result()
            .map(|_| ())
    }

    pub async fn set_nickname(&self, nickname: &str) -> Result<Response> {
        self.send(&Command::new("clientupdate").arg("client_nickname", nickname))
            .await
    }

    pub async fn register_event(&self, scope: &str) -> Result<Response> {
        self.send(&Command::new("servernotifyregister").arg("event", scope))
            .await
    }

    pub async fn whoami(&self) -> Result<WhoAmI> {
        let response = self.send(&Command::new("whoami")).await?.into_result()?;
        let record = response
            .first()
            .ok_or_else(|| QueryError::Protocol("empty whoami response".to_string()))?;
        WhoAmI::from_record(record)
    }

    pub async fn server_info(&self) -> Result<ServerInfo> {
        let response = self.send(&Command::new("serverinfo")).await?.into_result()?;
        let record = response
            .first()
            .ok_or_else(|| QueryError::Protocol("empty serverinfo response".to_string()))?;
        ServerInfo::from_record(record)
    }

    /// Every client currently connected to the bound server.
    pub async fn client_list(&self) -> Result<Vec<Client>> {
        let response = self.send(&Command::new("clientlist")).await?.into_result()?;
        response.records.iter().map(Client::from_record).collect()
    }

    pub async fn client_info(&self, client_id: u64) -> Result<ClientInfo> {
        let response = self
            .send(&Command::new("clientinfo").arg("clid", client_id))
            .await?
            .into_result()?;
        let record = response
            .first()
            .ok_or_else(|| QueryError::Protocol("empty clientinfo response".to_string()))?;
        ClientInfo::from_record(client_id, record)
    }

    pub async fn poke(&self, client_id: u64, message: &str) -> Result<Response> {
        self.send(
            &Command::new("clientpoke")
                .arg("clid", client_id)
                .arg("msg", message),
        )
        .await
    }

    pub async fn move_client(&self, client_id: u64, channel_id: u64) -> Result<Response> {
        self.send(
            &Command::new("clientmove")
                .arg("clid", client_id)
                .arg("cid", channel_id),
        )
        .await
    }

    pub async fn kick_from_server(&self, client_id: u64, reason: &str) -> Result<Response> {
        self.send(
            &Command::new("clientkick")
                .arg("clid", client_id)
                .arg("reasonid", KICK_FROM_SERVER)
                .arg("reasonmsg", reason),
        )
        .await
    }

    pub async fn send_private(&self, client_id: u64, message: &str) -> Result<Response> {
        self.send(
            &Command::new("sendtextmessage")
                .arg("targetmode", TargetMode::Private.as_wire())
                .arg("target", client_id)
                .arg("msg", message),
        )
        .await
    }
}
