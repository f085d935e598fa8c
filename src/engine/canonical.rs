// ==========================================
// 上门安装预约路由系统 - 区域代码规范化
// ==========================================
// 唯一入口: 配置加载 / 预约链接参数解析 / CSV 行解析 都经过这里
// 规则: 小写 → 德语变音转写 → 非字母数字转下划线 → 旧代码别名替换
// ==========================================

use std::collections::HashMap;

/// 内置旧区域代码别名（区域改名后保留的历史写法）
const LEGACY_ALIASES: [(&str, &str); 8] = [
    ("basel", "basel_fricktal"),
    ("fricktal", "basel_fricktal"),
    ("basel_land", "basel_fricktal"),
    ("zuerich", "zuerich_limmattal"),
    ("zurich", "zuerich_limmattal"),
    ("limmattal", "zuerich_limmattal"),
    ("mittelland", "mittelland_west"),
    ("bern", "mittelland_west"),
];

// ==========================================
// RegionAliases - 别名表
// ==========================================
#[derive(Debug, Clone)]
pub struct RegionAliases {
    aliases: HashMap<String, String>,
}

impl Default for RegionAliases {
    fn default() -> Self {
        let aliases = LEGACY_ALIASES
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        Self { aliases }
    }
}

impl RegionAliases {
    /// 内置别名 + 配置别名（配置优先）
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Self {
        let mut aliases = Self::default();
        for (from, to) in overrides {
            let from = slugify(from);
            let to = slugify(to);
            if !from.is_empty() && !to.is_empty() {
                aliases.aliases.insert(from, to);
            }
        }
        aliases
    }

    /// 规范化区域代码
    ///
    /// 别名只替换一次，不做链式解析，避免配置成环
    pub fn canonical(&self, raw: &str) -> String {
        let slug = slugify(raw);
        match self.aliases.get(&slug) {
            Some(target) => target.clone(),
            None => slug,
        }
    }
}

/// 转为 slug: 小写、变音转写、非字母数字折叠为单个下划线
pub fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;

    for ch in raw.trim().to_lowercase().chars() {
        let mapped: Option<&str> = match ch {
            'ä' => Some("ae"),
            'ö' => Some("oe"),
            'ü' => Some("ue"),
            'ß' => Some("ss"),
            'é' | 'è' | 'ê' => Some("e"),
            'à' | 'â' => Some("a"),
            _ => None,
        };

        if let Some(s) = mapped {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push_str(s);
        } else if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch);
        } else {
            pending_sep = true;
        }
    }
    out
}
