use crate::catalog::Catalog;
use crate::command::{Command, Verb};
use crate::error::{JukeboxError, Result};
use crate::playback::{PlaybackController, PlaybackError};
use jukebox_protocol::{Request, SessionConnector};
use log::{debug, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedReceiver;

pub const PROMPT: &str = ">> ";
pub const FAREWELL: &str = "Thank you for using Audio Client";

/// Command summary shown at startup and after an unrecognized command
pub const HELP: &str = "Use the following Commands to interact with Audio Client:
\tLIST
\tINFO [song number]
\tPLAY [song number]
\tSTOP
\tEXIT";

/// What the input loop should do after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Reads commands, validates them against the catalog and routes them to the
/// connector or the playback controller.
///
/// Every failure is reported on `output` and the loop carries on; only EXIT
/// (or end of input) ends it.
pub struct CommandDispatcher<W> {
    connector: SessionConnector,
    catalog: Catalog,
    playback: PlaybackController,
    playback_errors: UnboundedReceiver<PlaybackError>,
    output: W,
}

impl<W> CommandDispatcher<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(
        connector: SessionConnector,
        playback: PlaybackController,
        playback_errors: UnboundedReceiver<PlaybackError>,
        output: W,
    ) -> Self {
        Self {
            connector,
            catalog: Catalog::unavailable(),
            playback,
            playback_errors,
            output,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Print the command summary and fetch the catalog.
    ///
    /// A failed LIST is reported, and the catalog stays unavailable so every
    /// song index is rejected.
    pub async fn bootstrap(&mut self) -> Result<()> {
        self.say(HELP).await?;

        match self.load_catalog().await {
            Ok(()) => {
                info!(
                    "📚 Catalog loaded (max index {:?}); it will not be refreshed this session",
                    self.catalog.max_index()
                );
            }
            Err(e) => {
                warn!(
                    "⚠️ Catalog unavailable from {}, all song requests will be rejected: {}",
                    self.connector.server_address(),
                    e
                );
                self.report(&e).await?;
            }
        }
        Ok(())
    }

    async fn load_catalog(&mut self) -> Result<()> {
        let frame = self.connector.send_and_frame(&Request::List).await?;
        self.say(&frame.display_text()).await?;
        self.catalog = Catalog::from_frame(&frame);
        Ok(())
    }

    /// Run the interactive loop until EXIT or end of input
    pub async fn run<R>(&mut self, mut input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = String::new();
        loop {
            self.output.write_all(PROMPT.as_bytes()).await?;
            self.output.flush().await?;

            line.clear();
            if input.read_line(&mut line).await? == 0 {
                info!("EndOfFile on input, exiting");
                self.exit().await?;
                return Ok(());
            }

            if self.handle_line(&line).await? == Flow::Exit {
                return Ok(());
            }
        }
    }

    /// Handle one line of input. Command failures are reported, not returned;
    /// an `Err` means the output itself failed.
    pub async fn handle_line(&mut self, line: &str) -> Result<Flow> {
        self.report_playback_errors().await?;

        let command = Command::parse(line);
        debug!("Dispatching {:?}", command);

        match self.execute(command).await {
            Ok(flow) => Ok(flow),
            Err(e) => {
                self.report(&e).await?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn execute(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::List => self.show(Request::List).await,
            Command::Info(argument) => {
                let index = self.catalog.validate(Verb::Info, argument.as_deref())?;
                self.show(Request::Info(index)).await
            }
            Command::Play(argument) => {
                let index = self.catalog.validate(Verb::Play, argument.as_deref())?;
                self.play(index).await
            }
            Command::Stop => {
                self.playback.cancel().await;
                Ok(Flow::Continue)
            }
            Command::Exit => self.exit().await,
            Command::Empty => Ok(Flow::Continue),
            Command::Unknown(raw) => {
                debug!("Unrecognized command: {:?}", raw);
                self.say("Error: Unrecognized Command.").await?;
                self.say(HELP).await?;
                Ok(Flow::Continue)
            }
        }
    }

    /// LIST and INFO: one framed exchange, payload printed verbatim
    async fn show(&mut self, request: Request) -> Result<Flow> {
        let frame = self.connector.send_and_frame(&request).await?;
        self.say(&frame.display_text()).await?;
        Ok(Flow::Continue)
    }

    async fn play(&mut self, index: u32) -> Result<Flow> {
        // The old stream is released before the new request goes out
        self.playback.cancel().await;

        let stream = self.connector.open_stream(index).await?;
        self.playback.start(index, stream).await;
        Ok(Flow::Continue)
    }

    async fn exit(&mut self) -> Result<Flow> {
        self.playback.cancel().await;
        self.say(FAREWELL).await?;
        Ok(Flow::Exit)
    }

    async fn report_playback_errors(&mut self) -> Result<()> {
        while let Ok(failure) = self.playback_errors.try_recv() {
            self.report(&JukeboxError::from(failure)).await?;
        }
        Ok(())
    }

    async fn report(&mut self, error: &JukeboxError) -> Result<()> {
        match error {
            JukeboxError::Validation(_) => debug!("Rejected locally: {}", error),
            _ => warn!("❌ {}", error),
        }
        self.say(&format!("Error: {}", error)).await
    }

    async fn say(&mut self, text: &str) -> Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        if !text.ends_with('\n') {
            self.output.write_all(b"\n").await?;
        }
        self.output.flush().await?;
        Ok(())
    }
}
