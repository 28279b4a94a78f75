//! Gateway-side field-bus plumbing: a bounded Modbus/TCP connection pool,
//! a rising-edge poller that turns register bits into notifications, and a
//! dispatcher that turns inbound actions into register writes.

pub mod addr;
pub mod conn;
pub mod dispatcher;
pub mod poller;
pub mod pool;
pub mod uri;

pub use addr::TagAddress;
pub use conn::{ModbusConn, TcpModbusConn};
pub use dispatcher::Dispatcher;
pub use poller::Poller;
pub use pool::ConnPool;
pub use uri::PlcUri;
