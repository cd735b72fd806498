//! 批量写入报告

use crate::error::StorageError;

/// 单个块的写入结果。
#[derive(Debug, Clone)]
pub struct ChunkReport {
    pub index: usize,
    pub rows: usize,
    /// `None` 表示该块已提交。
    pub error: Option<StorageError>,
}

impl ChunkReport {
    pub fn committed(&self) -> bool {
        self.error.is_none()
    }
}

/// 一条报文的写入报告，按块顺序记录。
#[derive(Debug, Clone, Default)]
pub struct WriteReport {
    pub chunks: Vec<ChunkReport>,
}

impl WriteReport {
    pub fn push_committed(&mut self, index: usize, rows: usize) {
        self.chunks.push(ChunkReport {
            index,
            rows,
            error: None,
        });
    }

    pub fn push_failed(&mut self, index: usize, rows: usize, error: StorageError) {
        self.chunks.push(ChunkReport {
            index,
            rows,
            error: Some(error),
        });
    }

    pub fn written(&self) -> usize {
        self.chunks
            .iter()
            .filter(|chunk| chunk.committed())
            .map(|chunk| chunk.rows)
            .sum()
    }

    pub fn failed(&self) -> usize {
        self.chunks
            .iter()
            .filter(|chunk| !chunk.committed())
            .map(|chunk| chunk.rows)
            .sum()
    }

    pub fn committed_chunks(&self) -> usize {
        self.chunks.iter().filter(|chunk| chunk.committed()).count()
    }

    pub fn failed_chunks(&self) -> usize {
        self.chunks.len() - self.committed_chunks()
    }

    pub fn is_complete(&self) -> bool {
        self.chunks.iter().all(ChunkReport::committed)
    }
}
