use std::time::Duration;

use async_trait::async_trait;

use crate::errors::SimResult;

/// 缓存索引后端接口
///
/// 面向小记录的抽象键值存储，值为原始字节。带 TTL 的条目在
/// 读取时惰性过期并删除，不要求后台清扫。
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// 读取键值，过期条目返回 None 并被删除
    async fn get(&self, key: &str) -> SimResult<Option<Vec<u8>>>;

    /// 写入键值，ttl 为 None 表示永不过期
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> SimResult<()>;

    /// 删除键，返回键是否存在
    async fn delete(&self, key: &str) -> SimResult<bool>;

    /// 存在性检查，同样遵守惰性过期语义
    async fn exists(&self, key: &str) -> SimResult<bool>;

    /// 清空全部条目
    async fn clear(&self) -> SimResult<()>;
}
