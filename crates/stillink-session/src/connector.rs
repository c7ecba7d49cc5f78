use crate::error::Result;
use crate::session::{ConnectionSession, SessionConfig};

/// Connect to a rig with default configuration.
pub fn connect(addr: &str) -> Result<ConnectionSession> {
    connect_with_config(addr, SessionConfig::default())
}

/// Connect with explicit configuration.
pub fn connect_with_config(addr: &str, config: SessionConfig) -> Result<ConnectionSession> {
    let mut session: ConnectionSession = ConnectionSession::new(config);
    session.connect(addr)?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use stillink_message::{CommandMessage, PidGains, TelemetrySample};

    use super::*;
    use crate::error::SessionError;
    use crate::handshake::HandshakeConfig;
    use crate::listener::RigListener;
    use crate::state::ConnectionState;

    fn sample(runtime: f64) -> TelemetrySample {
        TelemetrySample::new(24.5, 25.0, runtime, "HEATING", PidGains::new(28.0, 1.0, 18.0))
            .unwrap()
    }

    fn poll_until(session: &mut ConnectionSession, want: usize) -> Vec<TelemetrySample> {
        let mut samples = Vec::new();
        for _ in 0..50 {
            samples.extend(session.poll(Duration::from_millis(100)).unwrap());
            if samples.len() >= want {
                break;
            }
        }
        samples
    }

    #[test]
    fn connect_convenience() {
        let listener = RigListener::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener.local_addr().to_string();

        let rig = thread::spawn(move || {
            let mut link = listener.accept().expect("listener should accept");
            link.send_heartbeat().unwrap();
            link.send_sample(&sample(1.0)).unwrap();
            link.send_sample(&sample(2.0)).unwrap();

            let mut commands = Vec::new();
            while commands.is_empty() {
                commands = link.recv_commands(Duration::from_secs(5)).unwrap();
            }
            commands
        });

        let mut session = connect(&addr).expect("client should connect");
        assert_eq!(session.state(), ConnectionState::Connected);

        let samples = poll_until(&mut session, 2);
        let runtimes: Vec<f64> = samples.iter().map(|s| s.runtime()).collect();
        assert_eq!(runtimes, vec![1.0, 2.0]);

        let tune = CommandMessage::tune(26.0, PidGains::new(28.0, 1.0, 18.0)).unwrap();
        session.send(&tune).unwrap();
        assert_eq!(rig.join().unwrap(), vec![tune]);
    }

    #[test]
    fn connect_with_ack_handshake() {
        let handshake = HandshakeConfig {
            await_ack: true,
            ..HandshakeConfig::default()
        };
        let listener = RigListener::bind("127.0.0.1:0")
            .unwrap()
            .with_handshake_config(handshake.clone());
        let addr = listener.local_addr().to_string();

        let rig = thread::spawn(move || {
            let mut link = listener.accept().unwrap();
            link.send_sample(&sample(5.0)).unwrap();
            link
        });

        let config = SessionConfig {
            handshake,
            ..SessionConfig::default()
        };
        let mut session = connect_with_config(&addr, config).unwrap();
        let samples = poll_until(&mut session, 1);
        assert_eq!(samples[0].runtime(), 5.0);
        drop(rig.join().unwrap());
    }

    #[test]
    fn rig_hangup_is_reported_once() {
        let listener = RigListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().to_string();

        let rig = thread::spawn(move || {
            let mut link = listener.accept().unwrap();
            link.close();
        });

        let mut session = connect(&addr).unwrap();
        rig.join().unwrap();

        let mut lost = 0;
        for _ in 0..20 {
            match session.poll(Duration::from_millis(100)) {
                Ok(_) => {}
                Err(SessionError::ConnectionLost(_)) => lost += 1,
                Err(SessionError::NotConnected) => break,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(lost, 1);
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn connect_refused_leaves_disconnected() {
        let addr = {
            let listener = RigListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().to_string()
        };

        let mut session: ConnectionSession = ConnectionSession::new(SessionConfig {
            connect_timeout: Duration::from_millis(500),
            ..SessionConfig::default()
        });
        let err = session.connect(&addr).unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }
}
