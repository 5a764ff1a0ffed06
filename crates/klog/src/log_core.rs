//! 日志系统核心实现
//!
//! 该模块将所有日志状态和逻辑封装到一个单独的 `LogCore` 结构体中，
//! 可以在保持**无锁、零分配**设计的同时，独立实例化用于测试。

use crate::buffer::GlobalLogBuffer;
use crate::config::{DEFAULT_CONSOLE_LEVEL, DEFAULT_LOG_LEVEL};
use crate::entry::LogEntry;
use crate::level::LogLevel;
use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

/// 核心日志系统
///
/// 封装了环形缓冲区和过滤状态。可以为测试目的而实例化，
/// 或在生产环境中用作全局单例。
///
/// # 线程安全性
///
/// 所有方法都使用原子操作进行同步，使得整个结构体在
/// 线程之间安全共享，无需外部加锁。
pub struct LogCore {
    /// 用于日志存储的无锁环形缓冲区
    buffer: GlobalLogBuffer,

    /// 全局日志级别阈值（控制日志是否缓冲）
    global_level: AtomicU8,

    /// 控制台输出级别阈值（控制是否立即打印）
    console_level: AtomicU8,
}

impl LogCore {
    /// 使用默认日志级别创建新的 LogCore 实例
    ///
    /// 这是一个 `const fn`，可以在编译时进行评估，
    /// 从而实现零开销的静态初始化。
    pub const fn default() -> Self {
        Self {
            buffer: GlobalLogBuffer::new(),
            global_level: AtomicU8::new(DEFAULT_LOG_LEVEL as u8),
            console_level: AtomicU8::new(DEFAULT_CONSOLE_LEVEL as u8),
        }
    }

    /// 使用自定义日志级别创建新的 LogCore 实例
    ///
    /// # 参数
    ///
    /// * `global_level` - 日志被缓冲的最低级别
    /// * `console_level` - 日志被打印到控制台的最低级别
    pub fn new(global_level: LogLevel, console_level: LogLevel) -> Self {
        Self {
            buffer: GlobalLogBuffer::new(),
            global_level: AtomicU8::new(global_level as u8),
            console_level: AtomicU8::new(console_level as u8),
        }
    }

    /// 核心日志记录实现
    ///
    /// 此方法由生产宏（通过全局单例）和测试代码（通过本地实例）调用。
    ///
    /// 流程：级别过滤 → 采集上下文 → 栈上构造条目 → 无锁写入缓冲区 →
    /// 可选的即时控制台输出。
    ///
    /// # 参数
    ///
    /// * `level` - 日志级别 (Emergency 到 Debug)
    /// * `args` - 来自 `format_args!` 的格式化参数
    pub fn _log(&self, level: LogLevel, args: fmt::Arguments) {
        if !self.is_level_enabled(level) {
            return;
        }

        let (cpu_id, task_id, timestamp) = if let Some(provider) = crate::get_context_provider() {
            (provider.cpu_id(), provider.task_id(), provider.timestamp())
        } else {
            // 如果没有注册 provider，使用默认值
            (0, 0, 0)
        };

        let entry = LogEntry::from_args(level, cpu_id, task_id, timestamp, args);

        self.buffer.write(&entry, formatted_length(&entry));

        if self.is_console_level(level) {
            self.direct_print_entry(&entry);
        }
    }

    /// 从缓冲区读取下一个日志条目
    ///
    /// 如果没有可用条目，则返回 `None`。这是一个**无锁**的
    /// 单消费者操作。
    pub fn _read_log(&self) -> Option<LogEntry> {
        self.buffer.read().map(|(entry, _)| entry)
    }

    /// 非破坏性读取：按索引 peek 日志条目，不移动读指针
    pub fn _peek_log(&self, index: usize) -> Option<LogEntry> {
        self.buffer.peek(index)
    }

    /// 获取当前可读取的起始索引
    pub fn _log_reader_index(&self) -> usize {
        self.buffer.reader_index()
    }

    /// 获取当前写入位置
    pub fn _log_writer_index(&self) -> usize {
        self.buffer.writer_index()
    }

    /// 返回未读日志条目的数量
    pub fn _log_len(&self) -> usize {
        self.buffer.len()
    }

    /// 返回未读日志的总字节数（格式化后）
    pub fn _log_unread_bytes(&self) -> usize {
        self.buffer.unread_bytes()
    }

    /// 返回由于缓冲区溢出而丢弃的日志计数
    pub fn _log_dropped_count(&self) -> usize {
        self.buffer.dropped_count()
    }

    /// 设置全局日志级别阈值
    ///
    /// 级别 > 阈值的日志将被丢弃。
    pub fn _set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Release);
    }

    /// 获取当前全局日志级别
    pub fn _get_global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Acquire))
    }

    /// 设置控制台输出级别阈值
    ///
    /// 只有级别 <= 阈值的日志才会立即打印。
    pub fn _set_console_level(&self, level: LogLevel) {
        self.console_level.store(level as u8, Ordering::Release);
    }

    /// 获取当前控制台输出级别
    pub fn _get_console_level(&self) -> LogLevel {
        LogLevel::from_u8(self.console_level.load(Ordering::Acquire))
    }

    // ========== 内部辅助函数 ==========

    /// 检查日志级别是否启用 (全局过滤器)
    #[inline(always)]
    fn is_level_enabled(&self, level: LogLevel) -> bool {
        level as u8 <= self.global_level.load(Ordering::Acquire)
    }

    /// 检查日志是否应该打印到控制台
    #[inline(always)]
    fn is_console_level(&self, level: LogLevel) -> bool {
        level as u8 <= self.console_level.load(Ordering::Acquire)
    }

    /// 将日志条目直接打印到控制台
    ///
    /// 格式化逻辑必须与 [`format_log_entry`] 和 [`formatted_length`] 保持一致。
    fn direct_print_entry(&self, entry: &LogEntry) {
        use alloc::format;

        let formatted = format!("{}\n", format_log_entry(entry));

        if let Some(output) = crate::get_log_output() {
            output.write_str(&formatted);
        }
    }
}

// 标记为 Sync 允许在 static 中使用
unsafe impl Sync for LogCore {}

/// 格式化日志条目为字符串（带 ANSI 颜色和上下文信息）
///
/// 将 LogEntry 格式化为用户可读的字符串，用于 syslog 系统调用等场景。
///
/// # 格式
/// ```text
/// <color_code>LEVEL [   timestamp] [CPU<id>/T<tid>] message<reset>
/// ```
pub fn format_log_entry(entry: &LogEntry) -> alloc::string::String {
    use alloc::format;

    format!(
        "{}{} [{:12}] [CPU{}/T{:3}] {}{}",
        entry.level().color_code(),
        entry.level().as_str(),
        entry.timestamp(),
        entry.cpu_id(),
        entry.task_id(),
        entry.message(),
        entry.level().reset_color_code()
    )
}

/// 计算条目格式化后的字节数，不经过堆分配
///
/// 与 [`format_log_entry`] 使用同一格式串，保证字节统计精确。
pub(crate) fn formatted_length(entry: &LogEntry) -> usize {
    use core::fmt::Write;

    struct CountingWriter(usize);

    impl Write for CountingWriter {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            self.0 += s.len();
            Ok(())
        }
    }

    let mut counter = CountingWriter(0);
    let _ = write!(
        counter,
        "{}{} [{:12}] [CPU{}/T{:3}] {}{}",
        entry.level().color_code(),
        entry.level().as_str(),
        entry.timestamp(),
        entry.cpu_id(),
        entry.task_id(),
        entry.message(),
        entry.level().reset_color_code()
    );
    counter.0
}
