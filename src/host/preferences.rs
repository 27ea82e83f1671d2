//! 偏好设置存储
//!
//! 保存两个标量偏好（目标语言、启用开关），修改后把新旧值成对推送给所有监听者。
//! 持久化后端可替换：TOML 文件或内存。

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::env::{self, EnvVar};
use crate::translation::config::constants;
use crate::translation::error::{TranslationError, TranslationResult};

/// 用户偏好
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub target_language: String,
    pub enabled: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            target_language: constants::DEFAULT_TARGET_LANGUAGE.to_string(),
            enabled: true,
        }
    }
}

/// 部分更新
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceUpdate {
    pub target_language: Option<String>,
    pub enabled: Option<bool>,
}

impl PreferenceUpdate {
    pub fn target_language(language: impl Into<String>) -> Self {
        Self {
            target_language: Some(language.into()),
            enabled: None,
        }
    }

    pub fn enabled(enabled: bool) -> Self {
        Self {
            target_language: None,
            enabled: Some(enabled),
        }
    }
}

/// 变更通知，每项为 `(旧值, 新值)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferenceChanges {
    pub target_language: Option<(String, String)>,
    pub enabled: Option<(bool, bool)>,
}

impl PreferenceChanges {
    pub fn is_empty(&self) -> bool {
        self.target_language.is_none() && self.enabled.is_none()
    }

    fn between(old: &Preferences, new: &Preferences) -> Self {
        Self {
            target_language: (old.target_language != new.target_language)
                .then(|| (old.target_language.clone(), new.target_language.clone())),
            enabled: (old.enabled != new.enabled).then_some((old.enabled, new.enabled)),
        }
    }
}

/// 持久化后端
pub trait PreferenceBackend {
    /// 读取已保存的偏好；从未保存过时返回 `None`
    fn load(&self) -> TranslationResult<Option<Preferences>>;

    fn save(&self, preferences: &Preferences) -> TranslationResult<()>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreferenceFile {
    target_language: String,
    enabled: bool,
    saved_at: Option<String>,
}

/// TOML 文件后端
#[derive(Debug, Clone)]
pub struct TomlFileBackend {
    path: PathBuf,
}

impl TomlFileBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceBackend for TomlFileBackend {
    fn load(&self) -> TranslationResult<Option<Preferences>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| TranslationError::PreferenceError(format!("读取偏好设置失败: {}", e)))?;
        let file: PreferenceFile = toml::from_str(&content)
            .map_err(|e| TranslationError::PreferenceError(format!("解析偏好设置失败: {}", e)))?;
        Ok(Some(Preferences {
            target_language: file.target_language,
            enabled: file.enabled,
        }))
    }

    fn save(&self, preferences: &Preferences) -> TranslationResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    TranslationError::PreferenceError(format!("创建偏好设置目录失败: {}", e))
                })?;
            }
        }

        let file = PreferenceFile {
            target_language: preferences.target_language.clone(),
            enabled: preferences.enabled,
            saved_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        let content = toml::to_string_pretty(&file)
            .map_err(|e| TranslationError::PreferenceError(format!("序列化偏好设置失败: {}", e)))?;
        std::fs::write(&self.path, content)
            .map_err(|e| TranslationError::PreferenceError(format!("写入偏好设置失败: {}", e)))?;

        tracing::debug!("偏好设置已保存到 {}", self.path.display());
        Ok(())
    }
}

/// 内存后端
#[derive(Debug, Default)]
pub struct MemoryBackend {
    stored: RefCell<Option<Preferences>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置已保存的偏好
    pub fn with_preferences(preferences: Preferences) -> Self {
        Self {
            stored: RefCell::new(Some(preferences)),
        }
    }

    /// 绕过存储直接改写后端内容，模拟其他进程写入
    pub fn overwrite(&self, preferences: Preferences) {
        *self.stored.borrow_mut() = Some(preferences);
    }
}

impl PreferenceBackend for MemoryBackend {
    fn load(&self) -> TranslationResult<Option<Preferences>> {
        Ok(self.stored.borrow().clone())
    }

    fn save(&self, preferences: &Preferences) -> TranslationResult<()> {
        *self.stored.borrow_mut() = Some(preferences.clone());
        Ok(())
    }
}

impl<T: PreferenceBackend + ?Sized> PreferenceBackend for std::rc::Rc<T> {
    fn load(&self) -> TranslationResult<Option<Preferences>> {
        (**self).load()
    }

    fn save(&self, preferences: &Preferences) -> TranslationResult<()> {
        (**self).save(preferences)
    }
}

/// 偏好设置存储
pub struct PreferenceStore {
    backend: Box<dyn PreferenceBackend>,
    current: RefCell<Preferences>,
    listeners: RefCell<Vec<mpsc::UnboundedSender<PreferenceChanges>>>,
}

impl PreferenceStore {
    /// 打开存储；后端为空时写入默认值
    pub fn open(backend: impl PreferenceBackend + 'static) -> TranslationResult<Self> {
        let current = match backend.load()? {
            Some(preferences) => preferences,
            None => {
                let defaults = Preferences {
                    enabled: env::Enabled::get_or_default(true),
                    ..Preferences::default()
                };
                backend.save(&defaults)?;
                tracing::info!("首次运行，写入默认偏好设置");
                defaults
            }
        };

        Ok(Self {
            backend: Box::new(backend),
            current: RefCell::new(current),
            listeners: RefCell::new(Vec::new()),
        })
    }

    /// 内存存储，主要用于测试和演示
    pub fn in_memory(preferences: Preferences) -> Self {
        Self {
            backend: Box::new(MemoryBackend::with_preferences(preferences.clone())),
            current: RefCell::new(preferences),
            listeners: RefCell::new(Vec::new()),
        }
    }

    pub fn get(&self) -> Preferences {
        self.current.borrow().clone()
    }

    pub fn target_language(&self) -> String {
        self.current.borrow().target_language.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.current.borrow().enabled
    }

    /// 修改偏好：校验、持久化，然后通知监听者
    pub fn set(&self, update: PreferenceUpdate) -> TranslationResult<PreferenceChanges> {
        let mut next = self.get();
        if let Some(language) = update.target_language {
            next.target_language = validate_language_code(&language)?;
        }
        if let Some(enabled) = update.enabled {
            next.enabled = enabled;
        }

        let changes = PreferenceChanges::between(&self.current.borrow(), &next);
        if changes.is_empty() {
            return Ok(changes);
        }

        self.backend.save(&next)?;
        *self.current.borrow_mut() = next;
        tracing::info!("偏好设置已更新: {:?}", changes);
        self.notify(&changes);
        Ok(changes)
    }

    /// 重新从后端读取，返回与内存值的差异并通知监听者
    pub fn reload(&self) -> TranslationResult<PreferenceChanges> {
        let Some(loaded) = self.backend.load()? else {
            return Ok(PreferenceChanges::default());
        };

        let changes = PreferenceChanges::between(&self.current.borrow(), &loaded);
        *self.current.borrow_mut() = loaded;
        if !changes.is_empty() {
            tracing::info!("重新加载偏好设置: {:?}", changes);
            self.notify(&changes);
        }
        Ok(changes)
    }

    /// 订阅变更
    pub fn on_change(&self) -> mpsc::UnboundedReceiver<PreferenceChanges> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.listeners.borrow_mut().push(sender);
        receiver
    }

    fn notify(&self, changes: &PreferenceChanges) {
        self.listeners
            .borrow_mut()
            .retain(|listener| listener.send(changes.clone()).is_ok());
    }
}

/// 校验语言代码：非空，不超过 16 个字符，只含 ASCII 字母数字和 `-`
pub fn validate_language_code(code: &str) -> TranslationResult<String> {
    let code = code.trim();
    let valid = !code.is_empty()
        && code.len() <= constants::MAX_LANGUAGE_CODE_LENGTH
        && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');

    if valid {
        Ok(code.to_string())
    } else {
        Err(TranslationError::PreferenceError(format!("无效的语言代码: {:?}", code)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_defaults_installed_on_first_open() {
        let backend = Rc::new(MemoryBackend::new());
        let store = PreferenceStore::open(backend.clone()).unwrap();

        assert_eq!(store.get(), Preferences::default());
        assert_eq!(backend.load().unwrap(), Some(Preferences::default()));
    }

    #[test]
    fn test_set_notifies_with_old_and_new() {
        let store = PreferenceStore::in_memory(Preferences::default());
        let mut changes = store.on_change();

        let result = store.set(PreferenceUpdate::target_language("es")).unwrap();
        assert_eq!(result.target_language, Some(("en".to_string(), "es".to_string())));
        assert_eq!(result.enabled, None);

        let received = changes.try_recv().unwrap();
        assert_eq!(received, result);
    }

    #[test]
    fn test_unchanged_set_is_silent() {
        let store = PreferenceStore::in_memory(Preferences::default());
        let mut changes = store.on_change();

        let result = store.set(PreferenceUpdate::enabled(true)).unwrap();
        assert!(result.is_empty());
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn test_invalid_language_rejected() {
        let store = PreferenceStore::in_memory(Preferences::default());
        for code in ["", "e s", "<script>", "a-very-long-language-tag"] {
            let err = store.set(PreferenceUpdate::target_language(code)).unwrap_err();
            assert!(matches!(err, TranslationError::PreferenceError(_)));
        }
        assert_eq!(store.target_language(), "en");
    }

    #[test]
    fn test_reload_picks_up_external_write() {
        let backend = Rc::new(MemoryBackend::with_preferences(Preferences::default()));
        let store = PreferenceStore::open(backend.clone()).unwrap();
        let mut changes = store.on_change();

        backend.overwrite(Preferences {
            target_language: "fr".to_string(),
            enabled: false,
        });
        let result = store.reload().unwrap();
        assert_eq!(result.enabled, Some((true, false)));
        assert!(!store.is_enabled());
        assert!(changes.try_recv().is_ok());
    }

    #[test]
    fn test_toml_backend_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("preferences.toml");

        let store = PreferenceStore::open(TomlFileBackend::new(&path)).unwrap();
        store.set(PreferenceUpdate::target_language("ja")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("targetLanguage = \"ja\""));
        assert!(content.contains("savedAt"));

        let reopened = PreferenceStore::open(TomlFileBackend::new(&path)).unwrap();
        assert_eq!(reopened.target_language(), "ja");
        assert!(reopened.is_enabled());
    }

    #[test]
    fn test_camel_case_json() {
        let prefs: Preferences =
            serde_json::from_str(r#"{"targetLanguage":"de","enabled":false}"#).unwrap();
        assert_eq!(prefs.target_language, "de");
        assert!(!prefs.enabled);
    }
}
