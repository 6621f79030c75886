//! Fire-and-forget delivery of control commands to the BMS.
use crate::log;
use crate::transport::Transport;

use std::io::Write;

use bms_monitor_api::Command;

/// Outcome of [`CommandSender::send`].
#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// No transport was ever opened; nothing was written.
    NoTransport,
    /// The write failed. Not retried.
    Failed,
}

/// Write half of the transport. Commands are written at most once and
/// no acknowledgement is awaited.
pub struct CommandSender {
    transport: Option<Box<dyn Transport>>,
}

impl CommandSender {
    pub fn new(transport: Option<Box<dyn Transport>>) -> Self {
        Self { transport }
    }

    pub fn send(&mut self, command: Command) -> Delivery {
        let transport = match self.transport.as_mut() {
            Some(transport) => transport,
            None => return Delivery::NoTransport,
        };

        let line = command.to_line();
        match transport
            .write_all(line.as_bytes())
            .and_then(|_| transport.flush())
        {
            Ok(()) => {
                log::status("Sent", format!("{} to {}", command, transport.describe()));
                Delivery::Sent
            }
            Err(e) => {
                log::err(format!(
                    "failed to send {} to {}: {}",
                    command,
                    transport.describe(),
                    e
                ));
                Delivery::Failed
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::mock::MockTransport;

    #[test]
    fn exact_bytes_per_command() {
        for command in Command::ALL {
            let mock = MockTransport::default();
            let mut sender = CommandSender::new(Some(Box::new(mock.clone())));
            assert_eq!(sender.send(command), Delivery::Sent);
            assert_eq!(mock.written(), format!("{}\n", command.token()).into_bytes());
        }
    }

    #[test]
    fn commands_are_written_in_order() {
        let mock = MockTransport::default();
        let mut sender = CommandSender::new(Some(Box::new(mock.clone())));
        sender.send(Command::BalancingStart);
        sender.send(Command::ErrorDetectionOff);
        assert_eq!(mock.written(), b"BB_Start\nED_OFF\n");
    }

    #[test]
    fn absent_transport_is_a_noop() {
        let mut sender = CommandSender::new(None);
        for command in Command::ALL {
            assert_eq!(sender.send(command), Delivery::NoTransport);
        }
    }

    #[test]
    fn write_failure_is_reported_not_retried() {
        let mock = MockTransport::default();
        let mut sender = CommandSender::new(Some(Box::new(mock.clone())));

        mock.set_broken(true);
        assert_eq!(sender.send(Command::BalancingStop), Delivery::Failed);
        mock.set_broken(false);
        assert!(mock.written().is_empty());

        assert_eq!(sender.send(Command::ErrorDetectionOn), Delivery::Sent);
        assert_eq!(mock.written(), b"ED_ON\n");
    }
}
