//! 脚本化串口链路（无硬件测试）
//!
//! - 读取队列：按顺序返回脚本化的数据块、超时或设备错误
//! - 应答器：写入特定字节后，把预设应答追加到读取队列（握手应答、设备字节）
//! - 连续数据流：读取队列为空时循环输出一段字节，模拟设备持续上报
//!
//! `purge` 会清空读取队列，但不影响连续数据流。

use crate::{ControlLine, ModemStatus, SerialDeviceError, SerialDeviceErrorKind, SerialError, SerialLink};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// 一次脚本化读取的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRead {
    Data(Vec<u8>),
    Timeout,
    Fail(SerialDeviceErrorKind),
}

/// 链路上发生的事件（按时间顺序记录）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Write(Vec<u8>),
    Line(ControlLine, bool),
    Purge,
}

#[derive(Debug)]
struct Responder {
    trigger: Vec<u8>,
    replies: VecDeque<MockRead>,
    /// 应答用完后是否重复最后一个
    repeat_last: bool,
    last: Option<MockRead>,
}

#[derive(Debug, Default)]
struct MockState {
    reads: VecDeque<MockRead>,
    responders: Vec<Responder>,
    stream: Vec<u8>,
    stream_cursor: usize,
    events: Vec<MockEvent>,
    modem: ModemStatus,
    fail_writes: Option<SerialDeviceErrorKind>,
}

impl MockState {
    fn on_write(&mut self, data: &[u8]) {
        self.events.push(MockEvent::Write(data.to_vec()));
        let mut queued = Vec::new();
        for responder in self.responders.iter_mut().filter(|r| r.trigger == data) {
            match responder.replies.pop_front() {
                Some(reply) => {
                    responder.last = Some(reply.clone());
                    queued.push(reply);
                },
                None if responder.repeat_last => {
                    if let Some(last) = responder.last.clone() {
                        queued.push(last);
                    }
                },
                None => {},
            }
        }
        self.reads.extend(queued);
    }

    fn read_stream(&mut self, buf: &mut [u8]) -> usize {
        if self.stream.is_empty() {
            return 0;
        }
        for byte in buf.iter_mut() {
            *byte = self.stream[self.stream_cursor];
            self.stream_cursor = (self.stream_cursor + 1) % self.stream.len();
        }
        buf.len()
    }
}

/// 脚本化串口链路
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
}

/// 测试侧句柄：编排脚本、检查事件
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    /// 创建链路及其控制句柄
    #[must_use]
    pub fn new() -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                state: state.clone(),
            },
            MockHandle { state },
        )
    }
}

impl MockHandle {
    /// 追加一块可读数据
    pub fn push_read(&self, data: impl Into<Vec<u8>>) {
        self.state.lock().reads.push_back(MockRead::Data(data.into()));
    }

    /// 追加一次读超时
    pub fn push_timeout(&self) {
        self.state.lock().reads.push_back(MockRead::Timeout);
    }

    /// 追加一次设备错误
    pub fn push_failure(&self, kind: SerialDeviceErrorKind) {
        self.state.lock().reads.push_back(MockRead::Fail(kind));
    }

    /// 写入 `trigger` 后依次应答 `replies`
    pub fn respond_to(&self, trigger: &[u8], replies: impl IntoIterator<Item = MockRead>) {
        self.state.lock().responders.push(Responder {
            trigger: trigger.to_vec(),
            replies: replies.into_iter().collect(),
            repeat_last: false,
            last: None,
        });
    }

    /// 每次写入 `trigger` 都应答 `reply`
    pub fn always_respond_to(&self, trigger: &[u8], reply: MockRead) {
        self.state.lock().responders.push(Responder {
            trigger: trigger.to_vec(),
            replies: VecDeque::from([reply]),
            repeat_last: true,
            last: None,
        });
    }

    /// 设备对 60 Hz / 50 Hz 握手总是正确应答
    pub fn accept_line_handshake(&self) {
        let reply = MockRead::Data(b"K7-MYO Ver 2.0\r".to_vec());
        self.always_respond_to(b"K7-MYO6", reply.clone());
        self.always_respond_to(b"K7-MYO5", reply);
    }

    /// 设置连续数据流（读取队列为空时循环输出）
    pub fn set_stream(&self, data: impl Into<Vec<u8>>) {
        let mut state = self.state.lock();
        state.stream = data.into();
        state.stream_cursor = 0;
    }

    pub fn clear_stream(&self) {
        self.state.lock().stream.clear();
    }

    pub fn set_modem_status(&self, status: ModemStatus) {
        self.state.lock().modem = status;
    }

    /// 之后的所有写入都返回设备错误
    pub fn fail_writes(&self, kind: SerialDeviceErrorKind) {
        self.state.lock().fail_writes = Some(kind);
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.state.lock().events.clone()
    }

    /// 仅写入事件
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                MockEvent::Write(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// 某段字节被写入的次数
    pub fn write_count(&self, data: &[u8]) -> usize {
        self.writes().iter().filter(|w| w.as_slice() == data).count()
    }

    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    pub fn pending_reads(&self) -> usize {
        self.state.lock().reads.len()
    }
}

impl SerialLink for MockLink {
    fn write(&mut self, data: &[u8]) -> Result<(), SerialError> {
        let mut state = self.state.lock();
        if let Some(kind) = state.fail_writes {
            return Err(SerialDeviceError::new(kind, "mock write failure").into());
        }
        state.on_write(data);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, SerialError> {
        let mut state = self.state.lock();
        match state.reads.pop_front() {
            Some(MockRead::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    let rest = data.split_off(n);
                    state.reads.push_front(MockRead::Data(rest));
                }
                if n == 0 {
                    return Err(SerialError::Timeout);
                }
                Ok(n)
            },
            Some(MockRead::Timeout) => Err(SerialError::Timeout),
            Some(MockRead::Fail(kind)) => {
                Err(SerialDeviceError::new(kind, "mock read failure").into())
            },
            None => match state.read_stream(buf) {
                0 => Err(SerialError::Timeout),
                n => Ok(n),
            },
        }
    }

    fn set_control_line(&mut self, line: ControlLine, level: bool) -> Result<(), SerialError> {
        self.state.lock().events.push(MockEvent::Line(line, level));
        Ok(())
    }

    fn purge(&mut self) -> Result<(), SerialError> {
        let mut state = self.state.lock();
        state.reads.clear();
        state.events.push(MockEvent::Purge);
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize, SerialError> {
        let state = self.state.lock();
        Ok(match state.reads.front() {
            Some(MockRead::Data(data)) => data.len(),
            Some(_) => 0,
            None => state.stream.len(),
        })
    }

    fn modem_status(&mut self) -> Result<ModemStatus, SerialError> {
        Ok(self.state.lock().modem)
    }
}
