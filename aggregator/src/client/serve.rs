use std::io;

use comms::{
    OnoReceiver, OnoSender,
    msg::{Command, Msg, Payload},
};
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};

use super::{Client, ClientResult, remote::kind};

/// Answers the requests of the tier above with a local client until it disconnects.
///
/// Client failures are sent back as `Msg::Err` and don't end the session, only io errors do.
///
/// # Arguments
/// * `client` - The local client answering the requests.
/// * `rx` - The receiving end of the channel to the tier above.
/// * `tx` - The sending end of the channel to the tier above.
///
/// # Returns
/// `Ok(())` once the tier above disconnects, or an io error.
pub async fn serve<C, R, W>(
    client: &mut C,
    mut rx: OnoReceiver<R>,
    mut tx: OnoSender<W>,
) -> io::Result<()>
where
    C: Client + ?Sized,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let msg: Msg = rx.recv().await?;
        debug!("serving {}", kind(&msg));

        let reply: ClientResult<Msg> = match msg {
            Msg::Control(Command::GetParameters) => client
                .get_parameters()
                .await
                .map(|params| Msg::Data(Payload::Params(params))),
            Msg::Data(Payload::Fit { round, params }) => {
                client.fit(round, params).await.map(|res| {
                    Msg::Data(Payload::FitRes {
                        params: res.params,
                        samples: res.samples,
                    })
                })
            }
            Msg::Data(Payload::Evaluate { round, params }) => {
                client.evaluate(round, params).await.map(|res| match res {
                    Some(res) => Msg::Control(Command::EvaluateRes {
                        loss: res.loss,
                        samples: res.samples,
                    }),
                    None => Msg::Control(Command::NotApplicable),
                })
            }
            Msg::Control(Command::Disconnect) => {
                info!("{} disconnected by the tier above", client.id());
                return Ok(());
            }
            other => {
                warn!("{} received an unexpected {}", client.id(), kind(&other));
                Ok(Msg::Err(format!("unexpected message: {}", kind(&other))))
            }
        };

        let reply = reply.unwrap_or_else(|e| {
            warn!("{} failed a request: {e}", client.id());
            Msg::Err(e.to_string())
        });

        tx.send(&reply).await?;
    }
}
