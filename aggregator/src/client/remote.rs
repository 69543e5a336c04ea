use comms::{
    OnoReceiver, OnoSender, Parameters,
    msg::{Command, Msg, Payload},
};
use tokio::io::{AsyncRead, AsyncWrite};

use super::{Client, ClientResult};
use crate::{ClientErr, EvaluateRes, FitRes};

/// A client on the other end of a `comms` channel.
pub struct RemoteClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    id: String,
    rx: OnoReceiver<R>,
    tx: OnoSender<W>,
}

impl<R, W> RemoteClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a new `RemoteClient`.
    ///
    /// # Arguments
    /// * `id` - Identifier used for observability, usually the peer address.
    /// * `rx` - The receiving end of the communication.
    /// * `tx` - The sending end of the communication.
    pub fn new(id: impl Into<String>, rx: OnoReceiver<R>, tx: OnoSender<W>) -> Self {
        Self {
            id: id.into(),
            rx,
            tx,
        }
    }

    /// Sends `msg` and waits for the answer, turning a remote error into a `ClientErr`.
    async fn request(&mut self, msg: &Msg) -> ClientResult<Msg> {
        self.tx.send(msg).await?;

        match self.rx.recv().await? {
            Msg::Err(detail) => Err(ClientErr::Remote(detail)),
            reply => Ok(reply),
        }
    }
}

/// Names a message kind without printing its (possibly huge) payload.
pub(super) fn kind(msg: &Msg) -> &'static str {
    match msg {
        Msg::Control(Command::GetParameters) => "get_parameters",
        Msg::Control(Command::EvaluateRes { .. }) => "evaluate_res",
        Msg::Control(Command::NotApplicable) => "not_applicable",
        Msg::Control(Command::Disconnect) => "disconnect",
        Msg::Data(Payload::Fit { .. }) => "fit",
        Msg::Data(Payload::Evaluate { .. }) => "evaluate",
        Msg::Data(Payload::FitRes { .. }) => "fit_res",
        Msg::Data(Payload::Params(_)) => "params",
        Msg::Err(_) => "err",
    }
}

#[async_trait::async_trait]
impl<R, W> Client for RemoteClient<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_parameters(&mut self) -> ClientResult<Parameters> {
        match self.request(&Msg::Control(Command::GetParameters)).await? {
            Msg::Data(Payload::Params(params)) => Ok(params),
            other => Err(ClientErr::UnexpectedMessage {
                expected: "params",
                got: kind(&other),
            }),
        }
    }

    async fn fit(&mut self, round: u64, params: Parameters) -> ClientResult<FitRes> {
        let msg = Msg::Data(Payload::Fit { round, params });

        match self.request(&msg).await? {
            Msg::Data(Payload::FitRes { params, samples }) => Ok(FitRes { params, samples }),
            other => Err(ClientErr::UnexpectedMessage {
                expected: "fit_res",
                got: kind(&other),
            }),
        }
    }

    async fn evaluate(
        &mut self,
        round: u64,
        params: Parameters,
    ) -> ClientResult<Option<EvaluateRes>> {
        let msg = Msg::Data(Payload::Evaluate { round, params });

        match self.request(&msg).await? {
            Msg::Control(Command::EvaluateRes { loss, samples }) => {
                Ok(Some(EvaluateRes { loss, samples }))
            }
            Msg::Control(Command::NotApplicable) => Ok(None),
            other => Err(ClientErr::UnexpectedMessage {
                expected: "evaluate_res",
                got: kind(&other),
            }),
        }
    }

    async fn disconnect(&mut self) -> ClientResult<()> {
        self.tx.send(&Msg::Control(Command::Disconnect)).await?;
        Ok(())
    }
}
