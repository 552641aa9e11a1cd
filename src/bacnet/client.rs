//! BACnet/IP client: one UDP socket, one target device, confirmed
//! ReadProperty of present-value.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::debug;

use crate::config::BacnetConfig;
use crate::poll::PointReader;

use super::codec::{self, AppValue, Reply};
use super::{PointId, PointValue, ReadError};

pub struct BacnetClient {
    socket: UdpSocket,
    device_addr: SocketAddr,
    read_timeout: Duration,
    invoke_id: u8,
}

impl BacnetClient {
    /// Bind the local BACnet/IP transport. The target device is fixed here
    /// for the lifetime of the client.
    pub async fn bind(config: &BacnetConfig) -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind(("0.0.0.0", config.local_port)).await?;
        debug!("BACnet/IP transport bound on {}", socket.local_addr()?);

        Ok(Self {
            socket,
            device_addr: SocketAddr::new(config.device_ip, config.device_port),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            invoke_id: 0,
        })
    }

    /// One request/reply round trip. Datagrams from other peers and replies
    /// to earlier, timed-out requests are discarded by invoke id.
    async fn exchange(&mut self, point: &PointId) -> Result<Reply, ReadError> {
        self.invoke_id = self.invoke_id.wrapping_add(1);
        let invoke_id = self.invoke_id;

        let request = codec::encode_read_property(invoke_id, point);
        self.socket.send_to(&request, self.device_addr).await?;

        let mut buf = [0u8; 1500];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            if from != self.device_addr {
                debug!("Ignoring datagram from unexpected peer {}", from);
                continue;
            }
            match codec::decode_reply(&buf[..len]) {
                Ok(reply) if reply.invoke_id() == invoke_id => return Ok(reply),
                Ok(reply) => {
                    debug!("Ignoring stale reply (invoke id {})", reply.invoke_id());
                }
                Err(e) => return Err(ReadError::Malformed(e.to_string())),
            }
        }
    }
}

impl PointReader for BacnetClient {
    async fn read(&mut self, point: &PointId) -> Result<PointValue, ReadError> {
        let reply = match tokio::time::timeout(self.read_timeout, self.exchange(point)).await {
            Ok(reply) => reply?,
            Err(_) => return Err(ReadError::Timeout(self.read_timeout)),
        };

        match reply {
            Reply::Ack { value, .. } => Ok(present_value(point, value)),
            Reply::ErrorPdu { class, code, .. } => Err(ReadError::ErrorResponse { class, code }),
            Reply::Reject { reason, .. } => Err(ReadError::Rejected(reason)),
            Reply::Abort { reason, .. } => Err(ReadError::Aborted(reason)),
        }
    }
}

/// Map a decoded application value to the published scalar. Binary objects
/// report present-value as Enumerated inactive/active; everything else
/// passes through.
fn present_value(point: &PointId, value: AppValue) -> PointValue {
    match value {
        AppValue::Enumerated(v) if point.kind.is_binary() => PointValue::Bool(v != 0),
        AppValue::Enumerated(v) => PointValue::Unsigned(v),
        AppValue::Null => PointValue::Null,
        AppValue::Bool(b) => PointValue::Bool(b),
        AppValue::Unsigned(v) => PointValue::Unsigned(v),
        AppValue::Signed(v) => PointValue::Signed(v),
        AppValue::Real(v) => PointValue::Real(f64::from(v)),
        AppValue::Double(v) => PointValue::Real(v),
        AppValue::Text(s) => PointValue::Text(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bacnet::ObjectKind;

    #[test]
    fn binary_enumerated_maps_to_bool() {
        let bv = PointId::new(ObjectKind::BinaryValue, 0);
        assert_eq!(
            present_value(&bv, AppValue::Enumerated(1)),
            PointValue::Bool(true)
        );
        assert_eq!(
            present_value(&bv, AppValue::Enumerated(0)),
            PointValue::Bool(false)
        );
    }

    #[test]
    fn multi_state_enumerated_stays_unsigned() {
        let msv = PointId::new(ObjectKind::MultiStateValue, 2);
        assert_eq!(
            present_value(&msv, AppValue::Enumerated(3)),
            PointValue::Unsigned(3)
        );
    }

    #[test]
    fn analog_real_widens_to_f64() {
        let av = PointId::new(ObjectKind::AnalogValue, 0);
        assert_eq!(
            present_value(&av, AppValue::Real(21.5)),
            PointValue::Real(21.5)
        );
    }
}
