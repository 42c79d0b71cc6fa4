use crate::input::{remaining, InputManager, Reaction};
use log::{debug, error, info};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::sleep;

/// Idle wait used when no word is on the clock.
const IDLE: Duration = Duration::from_secs(3600);

pub struct Client {
    server_lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    input_manager: InputManager,
}

impl Client {
    pub async fn new(server_addr: &str) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Connecting to server...");
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        info!("Connected to {}", stream.peer_addr()?);

        let (reader, writer) = stream.into_split();
        Ok(Client {
            server_lines: BufReader::new(reader).lines(),
            writer,
            input_manager: InputManager::new(),
        })
    }

    async fn apply(&mut self, reaction: Reaction) -> Result<(), Box<dyn std::error::Error>> {
        for line in reaction.show {
            println!("{}", line);
        }
        for line in reaction.send {
            debug!("Sending: {}", line);
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.write_all(b"\n").await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut stdin: Lines<BufReader<Stdin>> = BufReader::new(tokio::io::stdin()).lines();

        loop {
            let deadline = self.input_manager.deadline();
            let wait = deadline
                .map(|deadline| remaining(deadline, Instant::now()))
                .unwrap_or(IDLE);

            tokio::select! {
                line = self.server_lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            debug!("Received: {}", line);
                            let reaction = self
                                .input_manager
                                .on_server_line(&line, Instant::now());
                            self.apply(reaction).await?;
                        }
                        Ok(None) => {
                            info!("Server closed the connection");
                            break;
                        }
                        Err(e) => {
                            error!("Error reading from server: {}", e);
                            break;
                        }
                    }
                },

                input = stdin.next_line() => {
                    match input {
                        Ok(Some(line)) => {
                            let reaction = self.input_manager.on_input(&line, Instant::now());
                            self.apply(reaction).await?;
                        }
                        Ok(None) => {
                            info!("Input closed, leaving");
                            break;
                        }
                        Err(e) => {
                            error!("Error reading input: {}", e);
                            break;
                        }
                    }
                },

                _ = sleep(wait), if deadline.is_some() => {
                    let reaction = self.input_manager.on_deadline(Instant::now());
                    self.apply(reaction).await?;
                },
            }
        }

        if let Err(e) = self.writer.shutdown().await {
            debug!("Error closing connection: {}", e);
        }
        Ok(())
    }
}
