//! 日志条目结构
//!
//! 条目为定长栈上结构，消息按字符边界截断到
//! [`MAX_LOG_MESSAGE_LENGTH`] 字节，写入路径不经过堆分配器。

use crate::config::MAX_LOG_MESSAGE_LENGTH;
use crate::level::LogLevel;
use core::fmt;

/// 单条日志条目
///
/// 包含消息正文和记录时采集的上下文（CPU ID、任务 ID、时间戳）。
#[derive(Clone, Copy)]
pub struct LogEntry {
    level: LogLevel,
    cpu_id: usize,
    task_id: u32,
    timestamp: usize,
    msg_len: u16,
    msg: [u8; MAX_LOG_MESSAGE_LENGTH],
}

impl LogEntry {
    /// 全零的空条目（用于缓冲区槽位的 const 初始化）
    pub(crate) const fn empty() -> Self {
        Self {
            level: LogLevel::Debug,
            cpu_id: 0,
            task_id: 0,
            timestamp: 0,
            msg_len: 0,
            msg: [0; MAX_LOG_MESSAGE_LENGTH],
        }
    }

    /// 由 `format_args!` 就地构造条目，超长消息按字符边界截断
    pub fn from_args(
        level: LogLevel,
        cpu_id: usize,
        task_id: u32,
        timestamp: usize,
        args: fmt::Arguments,
    ) -> Self {
        let mut entry = Self {
            level,
            cpu_id,
            task_id,
            timestamp,
            msg_len: 0,
            msg: [0; MAX_LOG_MESSAGE_LENGTH],
        };

        let mut writer = TruncatingWriter {
            buf: &mut entry.msg,
            len: 0,
        };
        // 截断由 writer 自行处理，fmt 错误可忽略
        let _ = fmt::write(&mut writer, args);
        entry.msg_len = writer.len as u16;
        entry
    }

    /// 日志级别
    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// 记录时的 CPU ID
    pub fn cpu_id(&self) -> usize {
        self.cpu_id
    }

    /// 记录时的任务 ID
    pub fn task_id(&self) -> u32 {
        self.task_id
    }

    /// 记录时的时间戳
    pub fn timestamp(&self) -> usize {
        self.timestamp
    }

    /// 消息正文
    pub fn message(&self) -> &str {
        core::str::from_utf8(&self.msg[..self.msg_len as usize]).unwrap_or("")
    }
}

/// 向定长缓冲区写入并在容量耗尽时按字符边界截断的 fmt 适配器
struct TruncatingWriter<'a> {
    buf: &'a mut [u8; MAX_LOG_MESSAGE_LENGTH],
    len: usize,
}

impl fmt::Write for TruncatingWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let remaining = MAX_LOG_MESSAGE_LENGTH - self.len;
        let mut n = s.len().min(remaining);
        while n > 0 && !s.is_char_boundary(n) {
            n -= 1;
        }
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}
