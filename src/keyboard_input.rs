use crate::controller::{Disposition, ScannerHandle, ScannerSnapshot};
use crate::error::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a key press asks the scanner to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Start,
    Stop,
    SwitchCamera,
    Quit,
}

impl KeyAction {
    pub fn from_key(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::Char('s') | KeyCode::Enter => Some(KeyAction::Start),
            KeyCode::Char('x') => Some(KeyAction::Stop),
            KeyCode::Char('c') | KeyCode::Tab => Some(KeyAction::SwitchCamera),
            KeyCode::Char('q') | KeyCode::Esc => Some(KeyAction::Quit),
            _ => None,
        }
    }

    /// Actions the view should offer for `snapshot`; quit is always available
    pub fn available(snapshot: &ScannerSnapshot) -> Vec<KeyAction> {
        let mut actions = Vec::with_capacity(4);
        if snapshot.can_start() {
            actions.push(KeyAction::Start);
        }
        if snapshot.can_stop() {
            actions.push(KeyAction::Stop);
        }
        if snapshot.can_switch() {
            actions.push(KeyAction::SwitchCamera);
        }
        actions.push(KeyAction::Quit);
        actions
    }

    pub fn label(&self) -> &'static str {
        match self {
            KeyAction::Start => "s: start",
            KeyAction::Stop => "x: stop",
            KeyAction::SwitchCamera => "c: switch",
            KeyAction::Quit => "q: quit",
        }
    }
}

/// Terminal controls for the scanner: `s` start, `x` stop, `c` switch camera,
/// `q` quit
pub struct KeyboardInputHandler {
    scanner: ScannerHandle,
    cancellation_token: CancellationToken,
    quit: CancellationToken,
    input_task: Mutex<Option<JoinHandle<()>>>,
}

impl KeyboardInputHandler {
    pub fn new(scanner: ScannerHandle) -> Self {
        Self {
            scanner,
            cancellation_token: CancellationToken::new(),
            quit: CancellationToken::new(),
            input_task: Mutex::new(None),
        }
    }

    /// Token cancelled when the user presses the quit key
    pub fn quit_token(&self) -> CancellationToken {
        self.quit.clone()
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Starting keyboard input handler - s: start, x: stop, c: switch camera, q: quit");

        let scanner = self.scanner.clone();
        let cancellation_token = self.cancellation_token.clone();
        let quit = self.quit.clone();
        let runtime_handle = Handle::current();

        let input_task = task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            debug!("Raw mode enabled - keyboard handler active");

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
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }

                        match KeyAction::from_key(key_event.code) {
                            Some(KeyAction::Quit) => {
                                info!("Quit key pressed - requesting shutdown");
                                quit.cancel();
                                break;
                            }
                            Some(action) => {
                                let scanner = scanner.clone();
                                runtime_handle.spawn(async move {
                                    dispatch(&scanner, action).await;
                                });
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

            debug!("Keyboard input handler task exited");
        });
        *self.input_task.lock() = Some(input_task);

        Ok(())
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        let input_task = self.input_task.lock().take();
        if let Some(input_task) = input_task {
            // The poll loop notices cancellation within one poll interval
            if let Err(e) = input_task.await {
                error!("Keyboard input task failed: {}", e);
                let _ = disable_raw_mode();
            }
        }

        Ok(())
    }
}

/// Forward one key action to the scanner
pub async fn dispatch(scanner: &ScannerHandle, action: KeyAction) -> Option<Disposition> {
    let result = match action {
        KeyAction::Start => scanner.start_preferred().await,
        KeyAction::Stop => scanner.stop().await,
        KeyAction::SwitchCamera => scanner.switch_camera().await,
        KeyAction::Quit => return None,
    };

    match result {
        Ok(disposition) => {
            debug!("{:?} -> {:?}", action, disposition);
            Some(disposition)
        }
        Err(e) => {
            warn!("Failed to send {:?} to scanner: {}", action, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ControllerState, ScannerControllerBuilder};
    use crate::session::MockDecoder;
    use crate::types::CameraFacing;
    use std::sync::Arc;

    #[test]
    fn test_key_mapping() {
        assert_eq!(KeyAction::from_key(KeyCode::Char('s')), Some(KeyAction::Start));
        assert_eq!(KeyAction::from_key(KeyCode::Char('x')), Some(KeyAction::Stop));
        assert_eq!(KeyAction::from_key(KeyCode::Char('c')), Some(KeyAction::SwitchCamera));
        assert_eq!(KeyAction::from_key(KeyCode::Esc), Some(KeyAction::Quit));
        assert_eq!(KeyAction::from_key(KeyCode::Char(' ')), None);
    }

    #[tokio::test]
    async fn test_available_actions_follow_state() {
        let mock = Arc::new(MockDecoder::new());
        let scanner = ScannerControllerBuilder::new()
            .decoder(Arc::clone(&mock))
            .spawn()
            .unwrap();

        assert_eq!(
            KeyAction::available(&scanner.snapshot()),
            vec![KeyAction::Start, KeyAction::SwitchCamera, KeyAction::Quit]
        );

        scanner.start(CameraFacing::Back).await.unwrap();
        let scanning = scanner.wait_for(|s| s.state.is_scanning()).await.unwrap();
        assert_eq!(
            KeyAction::available(&scanning),
            vec![KeyAction::Stop, KeyAction::SwitchCamera, KeyAction::Quit]
        );

        mock.set_gated(true);
        scanner.switch_camera().await.unwrap();
        assert_eq!(
            KeyAction::available(&scanner.snapshot()),
            vec![KeyAction::Stop, KeyAction::Quit]
        );
        mock.release(2);
        scanner
            .wait_for(|s| s.state.active_facing() == Some(CameraFacing::Front) && s.state.is_scanning())
            .await
            .unwrap();
    }

    #[test]
    fn test_unsupported_camera_offers_only_quit() {
        let snapshot = ScannerSnapshot::initial(CameraFacing::Back, false);
        assert_eq!(KeyAction::available(&snapshot), vec![KeyAction::Quit]);
        assert_eq!(KeyAction::Quit.label(), "q: quit");
    }

    #[tokio::test]
    async fn test_dispatch_drives_scanner() {
        let mock = Arc::new(MockDecoder::new());
        let scanner = ScannerControllerBuilder::new()
            .decoder(Arc::clone(&mock))
            .spawn()
            .unwrap();

        assert_eq!(
            dispatch(&scanner, KeyAction::SwitchCamera).await,
            Some(Disposition::Accepted)
        );
        assert_eq!(dispatch(&scanner, KeyAction::Start).await, Some(Disposition::Accepted));
        scanner
            .wait_for(|s| s.state.is_scanning())
            .await
            .unwrap();
        assert_eq!(mock.open_calls(), vec![CameraFacing::Front]);

        assert_eq!(dispatch(&scanner, KeyAction::Quit).await, None);

        scanner.shutdown().await;
        assert_eq!(dispatch(&scanner, KeyAction::Stop).await, None);
        assert_eq!(scanner.snapshot().state, ControllerState::Stopped { reason: None });
    }

    #[tokio::test]
    async fn test_keyboard_handler_stop() {
        let mock = Arc::new(MockDecoder::new());
        let scanner = ScannerControllerBuilder::new().decoder(mock).spawn().unwrap();
        let handler = KeyboardInputHandler::new(scanner);

        assert!(!handler.quit_token().is_cancelled());
        handler.stop().await.unwrap();
        assert!(handler.cancellation_token.is_cancelled());
        assert!(!handler.quit_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_stop_waits_for_input_task() {
        let mock = Arc::new(MockDecoder::new());
        let scanner = ScannerControllerBuilder::new().decoder(mock).spawn().unwrap();
        let handler = KeyboardInputHandler::new(scanner);

        handler.start().await.unwrap();
        assert!(handler.input_task.lock().is_some());

        tokio::time::timeout(Duration::from_secs(2), handler.stop())
            .await
            .expect("keyboard handler did not stop")
            .unwrap();
        assert!(handler.input_task.lock().is_none());
    }
}
