//! User-facing notices, the host's equivalent of a page toast.

use std::fmt;

/// Notice titles used by the page session.
pub mod titles {
    /// Module failed to load.
    pub const LOAD_FAILED: &str = "WASM加载失败";
    /// Handler called before a module is ready.
    pub const NOT_LOADED: &str = "WASM未加载";
    /// Numeric handler succeeded.
    pub const COMPUTED: &str = "计算完成";
    /// String handler succeeded.
    pub const GENERATED: &str = "生成成功";
    /// Handler call failed.
    pub const FAILED: &str = "计算失败";
    /// Blank name.
    pub const NAME_REQUIRED: &str = "请输入姓名";
    /// Factorial input out of range.
    pub const FACTORIAL_RANGE: &str = "请输入0-20的数字";
    /// Fibonacci input out of range.
    pub const FIBONACCI_RANGE: &str = "请输入 0-40 之间的数字";
}

/// Icon of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Success icon.
    Success,
    /// Error icon.
    Error,
    /// Text only.
    None,
}

/// A short message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Message text.
    pub title: String,
    /// Icon.
    pub kind: NoticeKind,
}

impl Notice {
    /// A success notice.
    pub fn success(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            kind: NoticeKind::Success,
        }
    }

    /// An error notice.
    pub fn error(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            kind: NoticeKind::Error,
        }
    }

    /// A text-only notice.
    pub fn text(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            kind: NoticeKind::None,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let icon = match self.kind {
            NoticeKind::Success => "✓ ",
            NoticeKind::Error => "✗ ",
            NoticeKind::None => "",
        };
        write!(f, "{}{}", icon, self.title)
    }
}
