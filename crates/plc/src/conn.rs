use async_trait::async_trait;
use autorc_protocol::CoreError;
use tokio_modbus::client::{Context as ModbusContext, Reader, Writer, tcp};
use tokio_modbus::slave::Slave;

use crate::uri::PlcUri;

/// One field-bus connection. The pool never reuses a connection across
/// acquires (§4.6): release always drops it, so an implementation only ever
/// serves a single in-flight request before being discarded.
#[async_trait]
pub trait ModbusConn: Send {
    fn can_read(&self) -> bool {
        true
    }

    fn can_write(&self) -> bool {
        true
    }

    async fn read_word(&mut self, register: u16) -> Result<u16, CoreError>;
    async fn write_word(&mut self, register: u16, value: u16) -> Result<(), CoreError>;
    async fn ping(&mut self) -> Result<(), CoreError>;
}

/// A Modbus/TCP connection, the only field-bus driver this implementation
/// ships (the gateway configuration's `modbus-tcp://` scheme is the only
/// one recognized by [`PlcUri`]).
pub struct TcpModbusConn {
    ctx: ModbusContext,
}

impl TcpModbusConn {
    pub async fn connect(uri: &PlcUri) -> Result<Self, CoreError> {
        let ctx = tcp::connect_slave(uri.socket_addr, Slave(uri.unit_id))
            .await
            .map_err(CoreError::transport)?;
        Ok(Self { ctx })
    }
}

#[async_trait]
impl ModbusConn for TcpModbusConn {
    async fn read_word(&mut self, register: u16) -> Result<u16, CoreError> {
        let words = self
            .ctx
            .read_holding_registers(register, 1)
            .await
            .map_err(CoreError::transport)?
            .map_err(|exception| CoreError::transport(std::io::Error::other(exception.to_string())))?;
        words
            .first()
            .copied()
            .ok_or_else(|| CoreError::DomainNotFound(format!("no register returned for {register}")))
    }

    async fn write_word(&mut self, register: u16, value: u16) -> Result<(), CoreError> {
        self.ctx
            .write_single_register(register, value)
            .await
            .map_err(CoreError::transport)?
            .map_err(|exception| CoreError::transport(std::io::Error::other(exception.to_string())))
    }

    async fn ping(&mut self) -> Result<(), CoreError> {
        self.read_word(0).await.map(|_| ())
    }
}
