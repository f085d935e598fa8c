// ==========================================
// 上门安装预约路由系统 - 车程表导入错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 文件级错误才会出现在这里；行级错误直接跳过计数
// ==========================================

use thiserror::Error;

/// 车程表加载错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DistanceError {
    #[error("车程文件不存在: {0}")]
    FileNotFound(String),

    #[error("车程文件读取失败: {path}: {message}")]
    FileReadError { path: String, message: String },

    #[error("车程文件为空: {0}")]
    EmptyFile(String),

    #[error("车程文件缺少必需列 '{column}': {path}")]
    MissingHeader { path: String, column: String },

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),
}

impl DistanceError {
    /// 稳定的错误代码（用于运维提示去重与清除）
    pub fn code(&self) -> &'static str {
        match self {
            DistanceError::FileNotFound(_) => "distance_file_missing",
            DistanceError::FileReadError { .. } => "distance_file_unreadable",
            DistanceError::EmptyFile(_) => "distance_file_empty",
            DistanceError::MissingHeader { .. } => "distance_header_missing",
            DistanceError::CsvParseError(_) => "distance_csv_invalid",
        }
    }
}

/// 全部错误代码，加载成功后统一清除
pub const DISTANCE_ERROR_CODES: [&str; 5] = [
    "distance_file_missing",
    "distance_file_unreadable",
    "distance_file_empty",
    "distance_header_missing",
    "distance_csv_invalid",
];

// 实现 From<csv::Error>
impl From<csv::Error> for DistanceError {
    fn from(err: csv::Error) -> Self {
        DistanceError::CsvParseError(err.to_string())
    }
}

/// Result 类型别名
pub type DistanceResult<T> = Result<T, DistanceError>;
