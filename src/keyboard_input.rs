use crate::error::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Operator commands delivered to the frame loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Clear buffers and motion history, return to static mode
    Reset,
    /// Toggle per-frame gate diagnostics logging
    ToggleDiagnostics,
    /// Stop the bridge
    Shutdown,
}

/// Map a key to its command
pub fn command_for_key(code: KeyCode) -> Option<ControlCommand> {
    match code {
        KeyCode::Char('r') | KeyCode::Char('R') => Some(ControlCommand::Reset),
        KeyCode::Char('d') | KeyCode::Char('D') => Some(ControlCommand::ToggleDiagnostics),
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(ControlCommand::Shutdown),
        _ => None,
    }
}

/// Keyboard control for interactive sessions
pub struct KeyboardInputHandler {
    control: mpsc::UnboundedSender<ControlCommand>,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(control: mpsc::UnboundedSender<ControlCommand>) -> Self {
        Self {
            control,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Starting keyboard control - r: reset, d: diagnostics, q: quit");

        let control = self.control.clone();
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Keyboard input handler stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        // Only handle key press events (not release)
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }

                        match command_for_key(key_event.code) {
                            Some(command) => {
                                info!("Key {:?} pressed - {:?}", key_event.code, command);
                                if control.send(command).is_err() {
                                    debug!("Control channel closed");
                                    break;
                                }
                                if command == ControlCommand::Shutdown {
                                    break;
                                }
                            }
                            None => debug!("Key pressed: {:?}", key_event.code),
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }
        });

        Ok(())
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Give the blocking task a poll interval to restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;

        let _ = disable_raw_mode();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(command_for_key(KeyCode::Char('r')), Some(ControlCommand::Reset));
        assert_eq!(
            command_for_key(KeyCode::Char('d')),
            Some(ControlCommand::ToggleDiagnostics)
        );
        assert_eq!(command_for_key(KeyCode::Char('q')), Some(ControlCommand::Shutdown));
        assert_eq!(command_for_key(KeyCode::Esc), Some(ControlCommand::Shutdown));
        assert_eq!(command_for_key(KeyCode::Char(' ')), None);
        assert_eq!(command_for_key(KeyCode::Enter), None);
    }

    #[tokio::test]
    async fn test_keyboard_handler_stop() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let handler = KeyboardInputHandler::new(tx);

        assert!(!handler.cancellation_token.is_cancelled());
        handler.stop().await.unwrap();
        assert!(handler.cancellation_token.is_cancelled());
    }
}
