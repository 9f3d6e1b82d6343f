//! 进程内 Mock 协作者
//!
//! [`LocalBus`]：同步的进程内 [`MessageBus`]，在发布者线程上直接调用回调。
//! [`SyntheticGrabber`]：按固定间隔生成合成图像帧。
//! 用于测试与演示，无需消息中间件或真实相机。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use contracts::{
    BusCallback, BusMessage, ContractError, FrameGrabber, MessageBus, MessageKind, RawFrame,
    SubscriptionId,
};
use tracing::{debug, trace};

use crate::worker::wall_clock_ms;

struct Subscriber {
    channel: String,
    kind: MessageKind,
    callback: BusCallback,
}

/// 进程内消息总线
#[derive(Default)]
pub struct LocalBus {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<SubscriptionId, Subscriber>>,
    shut_down: AtomicBool,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 将 `msg` 投递给 `channel` 的所有订阅者，返回投递数量。
    ///
    /// 回调在调用线程上执行，且不持有订阅表锁。
    pub fn publish(&self, channel: &str, msg: BusMessage) -> usize {
        let callbacks: Vec<BusCallback> = match self.subscribers.read() {
            Ok(subs) => subs
                .values()
                .filter(|s| s.channel == channel)
                .map(|s| s.callback.clone())
                .collect(),
            Err(_) => return 0,
        };

        trace!(channel, kind = %msg.kind(), subscribers = callbacks.len(), "Publishing");
        let delivered = callbacks.len();
        if let Some((last, rest)) = callbacks.split_last() {
            for callback in rest {
                callback(msg.clone());
            }
            last(msg);
        }
        delivered
    }

    pub fn subscription_count(&self) -> usize {
        self.subscribers.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Declared kind of a live subscription
    pub fn subscription_kind(&self, id: SubscriptionId) -> Option<MessageKind> {
        self.subscribers
            .read()
            .ok()
            .and_then(|s| s.get(&id).map(|sub| sub.kind))
    }
}

impl MessageBus for LocalBus {
    fn subscribe(
        &self,
        channel: &str,
        kind: MessageKind,
        callback: BusCallback,
    ) -> Result<SubscriptionId, ContractError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(ContractError::channel_unavailable(channel, "bus is shut down"));
        }
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subs = self
            .subscribers
            .write()
            .map_err(|_| ContractError::channel_unavailable(channel, "bus lock poisoned"))?;
        subs.insert(
            id,
            Subscriber {
                channel: channel.to_string(),
                kind,
                callback,
            },
        );
        debug!(channel, kind = %kind, id = id.0, "Subscribed");
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if let Ok(mut subs) = self.subscribers.write() {
            subs.remove(&id);
        }
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        if let Ok(mut subs) = self.subscribers.write() {
            subs.clear();
        }
        debug!("Local bus shut down");
    }
}

/// 合成帧采集后端
pub struct SyntheticGrabber {
    name: String,
    width: u32,
    height: u32,
    interval: Duration,
    fail_every: Option<u32>,
    fail_open: bool,
    opened: bool,
    grabs: u32,
    base_ms: u64,
    seq: u64,
    released: Arc<AtomicBool>,
}

impl SyntheticGrabber {
    /// 3-channel frames of `width` x `height`, one every 10 ms
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            interval: Duration::from_millis(10),
            fail_every: None,
            fail_open: false,
            opened: false,
            grabs: 0,
            base_ms: wall_clock_ms(),
            seq: 0,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// 每第 `n` 次采集返回错误
    pub fn failing_every(mut self, n: u32) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    /// 让 `open()` 失败
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// grabber 被释放后置位
    pub fn released_flag(&self) -> Arc<AtomicBool> {
        self.released.clone()
    }
}

impl FrameGrabber for SyntheticGrabber {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<(), ContractError> {
        if self.fail_open {
            return Err(ContractError::channel_unavailable(&self.name, "device not found"));
        }
        self.opened = true;
        Ok(())
    }

    fn grab(&mut self) -> Result<Option<RawFrame>, ContractError> {
        if !self.opened {
            return Err(ContractError::channel_unavailable(&self.name, "grabber not open"));
        }
        self.grabs += 1;
        if self.fail_every.is_some_and(|n| self.grabs % n == 0) {
            return Err(ContractError::Other(format!("synthetic grab failure #{}", self.grabs)));
        }

        thread::sleep(self.interval);
        self.seq += 1;
        let step_ms = (self.interval.as_millis() as u64).max(1);
        let size = (self.width * self.height * 3) as usize;
        Ok(Some(RawFrame {
            device_time_ms: Some(self.base_ms + self.seq * step_ms),
            width: self.width,
            height: self.height,
            channels: 3,
            pixels: Bytes::from(vec![(self.seq % 256) as u8; size]),
        }))
    }

    fn release(&mut self) {
        self.opened = false;
        self.released.store(true, Ordering::SeqCst);
    }
}
