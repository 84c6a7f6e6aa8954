/// 管线深度的默认值：请求队列和应答匹配队列的容量
pub const DEFAULT_PIPELINE_SIZE: usize = 10;

/// 读缓冲区初始容量
pub(crate) const READ_BUFFER_CAPACITY: usize = 4 * 1024;

/// 单个 Bulk 字符串的最大长度，与 Redis 的 proto-max-bulk-len 默认值相同
pub(crate) const MAX_BULK_LEN: usize = 512 * 1024 * 1024;
