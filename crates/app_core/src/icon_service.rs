//! Icon, thumbnail and overlay resolution
//!
//! Lookup order for [`IconService::resolve_icon`]:
//! 1. Per-item image factory (thumbnail or icon)
//! 2. System image list, by the index the shell reports for the path
//! 3. Generic folder or file icon from the system libraries
//!
//! Image list access is serialized by two locks, one for icons and one for
//! overlays. The locks cover only the image list query, never cache access
//! or encoding.

use crate::bitmap::{encode_bitmap, encode_icon, IconPixels};
use crate::config::{IconsConfig, ShellMetaConfig};
use crate::icon_cache::{IconCache, IconCacheKey, IconRecord};
use crate::imaging::{IconOptions, ImageListTier, ShellImaging};
use parking_lot::Mutex;

/// Cache source name for system image list entries
const SYSTEM_IMAGE_LIST: &str = "<system image list>";

/// Generic icon used when the shell reports index 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericIcon {
    pub library: String,
    pub index: i32,
}

impl GenericIcon {
    fn resolve(library: &str, index: i32) -> Self {
        let library = match app_fs::system_directory() {
            Some(dir) => app_fs::win_path::join(&dir, library),
            None => library.to_string(),
        };
        Self { library, index }
    }
}

pub struct IconService {
    imaging: Box<dyn ShellImaging>,
    icon_lock: Mutex<()>,
    overlay_lock: Mutex<()>,
    /// Icons by explicit index and size
    dll_icons: IconCache,
    /// Every icon of a binary, at native size
    embedded_icons: IconCache,
    /// System image list icons by tier and index
    system_icons: IconCache,
    generic_folder: GenericIcon,
    generic_file: GenericIcon,
}

impl IconService {
    pub fn new(imaging: Box<dyn ShellImaging>, config: &ShellMetaConfig) -> Self {
        let IconsConfig {
            folder_library,
            folder_index,
            file_library,
            file_index,
            ..
        } = &config.icons;

        Self {
            imaging,
            icon_lock: Mutex::new(()),
            overlay_lock: Mutex::new(()),
            dll_icons: IconCache::from_config(&config.cache),
            embedded_icons: IconCache::from_config(&config.cache),
            system_icons: IconCache::from_config(&config.cache),
            generic_folder: GenericIcon::resolve(folder_library, *folder_index),
            generic_file: GenericIcon::resolve(file_library, *file_index),
        }
    }

    /// Service backed by the platform shell
    pub fn with_platform(config: &ShellMetaConfig) -> Self {
        Self::new(crate::platform::shell_imaging(), config)
    }

    pub fn generic_icon(&self, is_folder: bool) -> &GenericIcon {
        if is_folder {
            &self.generic_folder
        } else {
            &self.generic_file
        }
    }

    /// PNG bytes for the thumbnail or icon of `path` at roughly `size` pixels
    pub fn resolve_icon(
        &self,
        path: &str,
        size: i32,
        is_folder: bool,
        options: IconOptions,
    ) -> Option<Vec<u8>> {
        let item = self
            .imaging
            .item_image(path, size, options.item_image_flags())
            .and_then(|bitmap| {
                encode_bitmap(&bitmap)
                    .map_err(|e| tracing::debug!("Item image for {} not encodable: {}", path, e))
                    .ok()
            });

        if item.is_some() || options.contains(IconOptions::THUMBNAIL_ONLY) {
            return item;
        }

        let info = self.imaging.file_icon_info(path, is_folder, true)?;
        let index = info.icon_index();

        if index != 0 {
            let tier = ImageListTier::for_size(size);
            return self.system_icon(tier, index).map(|r| r.bytes.to_vec());
        }

        let generic = self.generic_icon(is_folder);
        tracing::trace!("Using generic icon {}#{} for {}", generic.library, generic.index, path);
        self.extract_selected_icons(&generic.library, &[generic.index], size)
            .into_iter()
            .find(|record| record.index == generic.index)
            .map(|record| record.bytes.to_vec())
    }

    fn system_icon(&self, tier: ImageListTier, index: i32) -> Option<IconRecord> {
        let key = IconCacheKey::new(SYSTEM_IMAGE_LIST, index, tier.code());
        if let Some(record) = self.system_icons.lookup(&key) {
            return Some(record);
        }

        let pixels = {
            let _guard = self.icon_lock.lock();
            self.imaging.image_list_icon(tier, index)
        }?;

        let record = encode_record(&pixels, index)?;
        self.system_icons.insert(key, record.clone());
        Some(record)
    }

    /// PNG bytes of the overlay badge (shortcut arrow, sync state, ...) of `path`
    pub fn resolve_overlay_badge(&self, path: &str, is_directory: bool) -> Option<Vec<u8>> {
        let info = self.imaging.file_icon_info(path, is_directory, false)?;
        let overlay = info.overlay_index();
        if overlay == 0 {
            return None;
        }

        let pixels = {
            let _guard = self.overlay_lock.lock();
            self.imaging.overlay_icon(overlay)
        }?;

        encode_icon(&pixels)
            .map_err(|e| tracing::debug!("Overlay {} not encodable: {}", overlay, e))
            .ok()
    }

    /// Icons with the given resource ids from `file`. Ids that cannot be
    /// extracted are left out.
    pub fn extract_selected_icons(&self, file: &str, indices: &[i32], size: i32) -> Vec<IconRecord> {
        indices
            .iter()
            .filter_map(|&index| {
                let key = IconCacheKey::new(file, index, size);
                if let Some(record) = self.dll_icons.lookup(&key) {
                    return Some(record);
                }

                let pixels = self.imaging.extract_dll_icon(file, index, size)?;
                let record = encode_record(&pixels, index)?;
                self.dll_icons.insert(key, record.clone());
                Some(record)
            })
            .collect()
    }

    /// Every icon embedded in `file`, or `None` when it has none
    pub fn extract_all_icons(&self, file: &str) -> Option<Vec<IconRecord>> {
        let count = self.imaging.dll_icon_count(file);
        if count == 0 {
            return None;
        }

        let records = (0..count)
            .filter_map(|position| {
                let index = position as i32;
                let key = IconCacheKey::whole_file(file, index);
                if let Some(record) = self.embedded_icons.lookup(&key) {
                    return Some(record);
                }

                let pixels = self.imaging.extract_icon_at(file, position)?;
                let record = encode_record(&pixels, index)?;
                self.embedded_icons.insert(key, record.clone());
                Some(record)
            })
            .collect();
        Some(records)
    }

    /// Give `folder` a custom icon, or drop its custom icon when `icon_file`
    /// is `None`
    pub fn set_custom_folder_icon(&self, folder: &str, icon_file: Option<&str>, index: i32) -> bool {
        if folder.is_empty() || !app_fs::path_exists(folder) {
            return false;
        }
        self.imaging.set_folder_icon(folder, icon_file, index)
    }

    /// Give the shortcut `link` a custom icon
    pub fn set_custom_file_icon(&self, link: &str, icon_file: &str, index: i32) -> bool {
        if link.is_empty() || icon_file.is_empty() {
            return false;
        }
        self.imaging.set_shortcut_icon(link, icon_file, index)
    }

    /// String resource `id` of `file`, such as a localized display name
    pub fn extract_string_from_dll(&self, file: &str, id: u32) -> Option<String> {
        if file.is_empty() {
            return None;
        }
        self.imaging.load_string(file, id)
    }

    /// Entry counts of the explicit-index, whole-file and image list caches
    pub fn cache_sizes(&self) -> (usize, usize, usize) {
        (
            self.dll_icons.len(),
            self.embedded_icons.len(),
            self.system_icons.len(),
        )
    }
}

fn encode_record(pixels: &IconPixels, index: i32) -> Option<IconRecord> {
    match encode_icon(pixels) {
        Ok(bytes) => Some(IconRecord::new(bytes, index)),
        Err(e) => {
            tracing::debug!("Icon {} not encodable: {}", index, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::RawBitmap;
    use crate::config::{CacheConfig, CachePolicy};
    use crate::imaging::{ItemImageFlags, ShellIconInfo};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Calls {
        item_image: AtomicUsize,
        image_list: AtomicUsize,
        overlay: AtomicUsize,
        dll: AtomicUsize,
        count: AtomicUsize,
        at: AtomicUsize,
        settings: AtomicUsize,
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Scripted shell that counts every native call
    struct CountingShell {
        calls: Arc<Calls>,
        thumbnail: bool,
        raw_index: Option<i32>,
        icons_in_file: u32,
        missing_dll_index: Option<i32>,
    }

    impl CountingShell {
        fn new(calls: Arc<Calls>) -> Self {
            Self {
                calls,
                thumbnail: false,
                raw_index: Some(7),
                icons_in_file: 3,
                missing_dll_index: None,
            }
        }
    }

    fn pixels(shade: u8) -> IconPixels {
        IconPixels {
            color: RawBitmap::new(2, 2, 32, vec![shade, shade, shade, 255].repeat(4)),
            mask: None,
        }
    }

    impl ShellImaging for CountingShell {
        fn item_image(&self, _path: &str, _size: i32, flags: ItemImageFlags) -> Option<RawBitmap> {
            bump(&self.calls.item_image);
            assert!(flags.contains(ItemImageFlags::BIGGER_SIZE_OK));
            self.thumbnail
                .then(|| RawBitmap::new(1, 1, 32, vec![1, 2, 3, 128]))
        }

        fn file_icon_info(&self, _path: &str, _dir: bool, _attrs: bool) -> Option<ShellIconInfo> {
            self.raw_index.map(|raw_index| ShellIconInfo { raw_index })
        }

        fn image_list_icon(&self, _tier: ImageListTier, index: i32) -> Option<IconPixels> {
            bump(&self.calls.image_list);
            Some(pixels(index as u8))
        }

        fn overlay_icon(&self, overlay_index: i32) -> Option<IconPixels> {
            bump(&self.calls.overlay);
            Some(pixels(overlay_index as u8))
        }

        fn extract_dll_icon(&self, _file: &str, index: i32, _size: i32) -> Option<IconPixels> {
            bump(&self.calls.dll);
            if self.missing_dll_index == Some(index) {
                return None;
            }
            Some(pixels(index as u8))
        }

        fn dll_icon_count(&self, _file: &str) -> u32 {
            bump(&self.calls.count);
            self.icons_in_file
        }

        fn extract_icon_at(&self, _file: &str, position: u32) -> Option<IconPixels> {
            bump(&self.calls.at);
            Some(pixels(position as u8))
        }

        fn set_folder_icon(&self, _folder: &str, icon_file: Option<&str>, index: i32) -> bool {
            bump(&self.calls.settings);
            icon_file.is_some() || index == 0
        }

        fn set_shortcut_icon(&self, link: &str, _icon_file: &str, _index: i32) -> bool {
            bump(&self.calls.settings);
            link.ends_with(".lnk")
        }

        fn load_string(&self, file: &str, id: u32) -> Option<String> {
            (id != 0).then(|| format!("{}#{}", file, id))
        }
    }

    fn service(shell: CountingShell) -> IconService {
        IconService::new(Box::new(shell), &ShellMetaConfig::default())
    }

    #[test]
    fn test_thumbnail_short_circuits() {
        let calls = Arc::new(Calls::default());
        let mut shell = CountingShell::new(calls.clone());
        shell.thumbnail = true;
        let svc = service(shell);

        let png = svc.resolve_icon("photo.jpg", 256, false, IconOptions::empty()).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(0, 0).0[3], 128);
        assert_eq!(get(&calls.image_list), 0);
    }

    #[test]
    fn test_thumbnail_only_never_falls_back() {
        let calls = Arc::new(Calls::default());
        let svc = service(CountingShell::new(calls.clone()));

        assert!(svc
            .resolve_icon("doc.txt", 48, false, IconOptions::THUMBNAIL_ONLY)
            .is_none());
        assert_eq!(get(&calls.item_image), 1);
        assert_eq!(get(&calls.image_list), 0);
    }

    #[test]
    fn test_image_list_icon_memoized() {
        let calls = Arc::new(Calls::default());
        let svc = service(CountingShell::new(calls.clone()));

        let first = svc.resolve_icon("doc.txt", 32, false, IconOptions::ICON_ONLY).unwrap();
        let second = svc.resolve_icon("doc.txt", 32, false, IconOptions::ICON_ONLY).unwrap();

        assert_eq!(first, second);
        assert_eq!(get(&calls.item_image), 2);
        assert_eq!(get(&calls.image_list), 1);

        // A different tier is a different entry
        svc.resolve_icon("doc.txt", 16, false, IconOptions::ICON_ONLY).unwrap();
        assert_eq!(get(&calls.image_list), 2);
    }

    #[test]
    fn test_index_zero_uses_generic_icon() {
        let calls = Arc::new(Calls::default());
        let mut shell = CountingShell::new(calls.clone());
        shell.raw_index = Some(0);
        let svc = service(shell);

        assert!(svc.resolve_icon("folder", 48, true, IconOptions::empty()).is_some());
        assert!(svc.resolve_icon("folder", 48, true, IconOptions::empty()).is_some());
        assert_eq!(get(&calls.image_list), 0);
        assert_eq!(get(&calls.dll), 1);
        assert!(svc.generic_icon(true).library.ends_with("imageres.dll"));
        assert_eq!(svc.generic_icon(false).index, 1);
    }

    #[test]
    fn test_no_shell_info_gives_nothing() {
        let calls = Arc::new(Calls::default());
        let mut shell = CountingShell::new(calls.clone());
        shell.raw_index = None;
        let svc = service(shell);

        assert!(svc.resolve_icon("ghost", 48, false, IconOptions::empty()).is_none());
        assert!(svc.resolve_overlay_badge("ghost", false).is_none());
    }

    #[test]
    fn test_overlay_badge() {
        let calls = Arc::new(Calls::default());
        let mut shell = CountingShell::new(calls.clone());
        shell.raw_index = Some((2 << 24) | 5);
        let svc = service(shell);

        assert!(svc.resolve_overlay_badge("link.lnk", false).is_some());
        assert_eq!(get(&calls.overlay), 1);
    }

    #[test]
    fn test_zero_overlay_skips_image_list() {
        let calls = Arc::new(Calls::default());
        let svc = service(CountingShell::new(calls.clone()));

        assert!(svc.resolve_overlay_badge("plain.txt", false).is_none());
        assert_eq!(get(&calls.overlay), 0);
    }

    #[test]
    fn test_selected_icons_cached_and_missing_skipped() {
        let calls = Arc::new(Calls::default());
        let mut shell = CountingShell::new(calls.clone());
        shell.missing_dll_index = Some(5);
        let svc = service(shell);

        let first = svc.extract_selected_icons("shell32.dll", &[1, 5, 3], 48);
        let second = svc.extract_selected_icons("shell32.dll", &[1, 5, 3], 48);

        assert_eq!(first.iter().map(|r| r.index).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(first, second);
        // Index 5 is retried because failures are never cached
        assert_eq!(get(&calls.dll), 4);
    }

    #[test]
    fn test_all_icons_cached() {
        let calls = Arc::new(Calls::default());
        let svc = service(CountingShell::new(calls.clone()));

        let first = svc.extract_all_icons("app.exe").unwrap();
        let second = svc.extract_all_icons("app.exe").unwrap();

        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        assert_eq!(get(&calls.at), 3);
        assert_eq!(get(&calls.count), 2);
        assert_eq!(svc.cache_sizes(), (0, 3, 0));
    }

    #[test]
    fn test_empty_binary_gives_none() {
        let calls = Arc::new(Calls::default());
        let mut shell = CountingShell::new(calls.clone());
        shell.icons_in_file = 0;
        let svc = service(shell);

        assert!(svc.extract_all_icons("data.bin").is_none());
    }

    #[test]
    fn test_lru_policy_bounds_caches() {
        let calls = Arc::new(Calls::default());
        let config = ShellMetaConfig {
            cache: CacheConfig {
                policy: CachePolicy::Lru,
                capacity: 2,
            },
            ..Default::default()
        };
        let svc = IconService::new(Box::new(CountingShell::new(calls.clone())), &config);

        svc.extract_selected_icons("shell32.dll", &[1, 2, 3, 4], 48);
        assert_eq!(svc.cache_sizes().0, 2);
    }

    /// Shell whose image list calls record any overlap with each other
    #[derive(Default)]
    struct ExclusiveShell {
        icon_busy: AtomicBool,
        overlay_busy: AtomicBool,
        overlapped: AtomicBool,
        icon_saw_overlay: AtomicBool,
        overlay_saw_icon: AtomicBool,
        queries: AtomicUsize,
    }

    impl ExclusiveShell {
        fn wait_for(flag: &AtomicBool) -> bool {
            let deadline = Instant::now() + Duration::from_secs(2);
            while Instant::now() < deadline {
                if flag.load(Ordering::SeqCst) {
                    return true;
                }
                std::thread::yield_now();
            }
            false
        }

        fn exclusive(&self, busy: &AtomicBool, f: impl FnOnce()) {
            if busy.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            bump(&self.queries);
            f();
            std::thread::sleep(Duration::from_millis(1));
            busy.store(false, Ordering::SeqCst);
        }
    }

    impl ShellImaging for Arc<ExclusiveShell> {
        fn item_image(&self, _path: &str, _size: i32, _flags: ItemImageFlags) -> Option<RawBitmap> {
            None
        }

        /// Paths are `<icon index>` or `<icon index>+<overlay index>`
        fn file_icon_info(&self, path: &str, _dir: bool, _attrs: bool) -> Option<ShellIconInfo> {
            let (icon, overlay) = path.split_once('+').unwrap_or((path, "0"));
            let icon: i32 = icon.parse().ok()?;
            let overlay: i32 = overlay.parse().ok()?;
            Some(ShellIconInfo {
                raw_index: (overlay << 24) | icon,
            })
        }

        fn image_list_icon(&self, _tier: ImageListTier, index: i32) -> Option<IconPixels> {
            self.exclusive(&self.icon_busy, || {
                if index == 1 && ExclusiveShell::wait_for(&self.overlay_busy) {
                    self.icon_saw_overlay.store(true, Ordering::SeqCst);
                }
            });
            Some(pixels(index as u8))
        }

        fn overlay_icon(&self, overlay_index: i32) -> Option<IconPixels> {
            self.exclusive(&self.overlay_busy, || {
                if overlay_index == 1 && ExclusiveShell::wait_for(&self.icon_busy) {
                    self.overlay_saw_icon.store(true, Ordering::SeqCst);
                }
            });
            Some(pixels(overlay_index as u8))
        }

        fn extract_dll_icon(&self, _file: &str, _index: i32, _size: i32) -> Option<IconPixels> {
            None
        }

        fn dll_icon_count(&self, _file: &str) -> u32 {
            0
        }

        fn extract_icon_at(&self, _file: &str, _position: u32) -> Option<IconPixels> {
            None
        }

        fn set_folder_icon(&self, _folder: &str, _icon_file: Option<&str>, _index: i32) -> bool {
            false
        }

        fn set_shortcut_icon(&self, _link: &str, _icon_file: &str, _index: i32) -> bool {
            false
        }

        fn load_string(&self, _file: &str, _id: u32) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_image_list_queries_never_overlap() {
        let shell = Arc::new(ExclusiveShell::default());
        let svc = IconService::new(Box::new(shell.clone()), &ShellMetaConfig::default());

        std::thread::scope(|scope| {
            for thread in 0..4 {
                let svc = &svc;
                scope.spawn(move || {
                    for i in 0..25 {
                        let path = format!("{}+{}", 2 + thread * 25 + i, 2 + i);
                        assert!(svc.resolve_icon(&path, 32, false, IconOptions::ICON_ONLY).is_some());
                        assert!(svc.resolve_overlay_badge(&path, false).is_some());
                    }
                });
            }
        });

        assert!(!shell.overlapped.load(Ordering::SeqCst));
        assert_eq!(get(&shell.queries), 100 + 100);
    }

    #[test]
    fn test_icon_and_overlay_locks_are_independent() {
        let shell = Arc::new(ExclusiveShell::default());
        let svc = IconService::new(Box::new(shell.clone()), &ShellMetaConfig::default());

        // Each query waits for the other kind to be in flight
        std::thread::scope(|scope| {
            scope.spawn(|| svc.resolve_icon("1", 32, false, IconOptions::ICON_ONLY));
            scope.spawn(|| svc.resolve_overlay_badge("3+1", false));
        });

        assert!(shell.icon_saw_overlay.load(Ordering::SeqCst));
        assert!(shell.overlay_saw_icon.load(Ordering::SeqCst));
        assert!(!shell.overlapped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cache_hits_do_not_take_icon_lock() {
        let shell = Arc::new(ExclusiveShell::default());
        let svc = IconService::new(Box::new(shell.clone()), &ShellMetaConfig::default());

        let first = svc.resolve_icon("9", 32, false, IconOptions::ICON_ONLY).unwrap();
        assert!(!svc.system_icons.is_empty());

        let _held = svc.icon_lock.lock();
        let second = svc.resolve_icon("9", 32, false, IconOptions::ICON_ONLY).unwrap();
        assert_eq!(first, second);
        assert_eq!(get(&shell.queries), 1);
    }

    #[test]
    fn test_failed_lookups_leave_caches_empty() {
        let calls = Arc::new(Calls::default());
        let mut shell = CountingShell::new(calls.clone());
        shell.missing_dll_index = Some(4);
        let svc = service(shell);

        assert!(svc.extract_selected_icons("shell32.dll", &[4], 48).is_empty());
        assert!(svc.dll_icons.is_empty());
        assert!(svc.embedded_icons.is_empty());
    }

    #[test]
    fn test_custom_icons_and_strings_pass_through() {
        let calls = Arc::new(Calls::default());
        let svc = service(CountingShell::new(calls.clone()));
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().to_str().unwrap();

        assert!(svc.set_custom_folder_icon(folder, Some(r"C:\icons\a.ico"), 2));
        assert!(svc.set_custom_folder_icon(folder, None, 0));
        assert!(!svc.set_custom_folder_icon(folder, None, 3));
        assert!(svc.set_custom_file_icon(r"C:\desk\app.lnk", r"C:\icons\a.ico", 0));
        assert!(!svc.set_custom_file_icon(r"C:\desk\app.exe", r"C:\icons\a.ico", 0));
        assert_eq!(get(&calls.settings), 5);

        assert_eq!(
            svc.extract_string_from_dll("shell32.dll", 4162).as_deref(),
            Some("shell32.dll#4162")
        );
        assert!(svc.extract_string_from_dll("shell32.dll", 0).is_none());
    }

    #[test]
    fn test_empty_targets_skip_the_shell() {
        let calls = Arc::new(Calls::default());
        let svc = service(CountingShell::new(calls.clone()));

        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");

        assert!(!svc.set_custom_folder_icon("", Some("a.ico"), 0));
        assert!(!svc.set_custom_folder_icon(gone.to_str().unwrap(), Some("a.ico"), 0));
        assert!(!svc.set_custom_file_icon("", "a.ico", 0));
        assert!(!svc.set_custom_file_icon("app.lnk", "", 0));
        assert!(svc.extract_string_from_dll("", 1).is_none());
        assert_eq!(get(&calls.settings), 0);
    }
}
