//! Synthesized browser/device profile for the challenge payload.
//!
//! Every value is rendered the way a browser's JavaScript would stringify
//! it: lowercase booleans, integral floats without a fraction, arrays joined
//! with `,` in the `key:value` list and `;` in the checksum list.

use super::murmur::x64hash128;
use base64::{ engine::general_purpose::STANDARD, Engine };
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use serde::{ Deserialize, Serialize };
use serde_json::{ json, Value };
use std::fmt;

pub const WEBGL_EXTENSIONS: [&str; 29] = [
    "ANGLE_instanced_arrays",
    "EXT_blend_minmax",
    "EXT_color_buffer_half_float",
    "EXT_disjoint_timer_query",
    "EXT_float_blend",
    "EXT_frag_depth",
    "EXT_shader_texture_lod",
    "EXT_texture_compression_bptc",
    "EXT_texture_compression_rgtc",
    "EXT_texture_filter_anisotropic",
    "EXT_sRGB",
    "KHR_parallel_shader_compile",
    "OES_element_index_uint",
    "OES_fbo_render_mipmap",
    "OES_standard_derivatives",
    "OES_texture_float",
    "OES_texture_float_linear",
    "OES_texture_half_float",
    "OES_texture_half_float_linear",
    "OES_vertex_array_object",
    "WEBGL_color_buffer_float",
    "WEBGL_compressed_texture_s3tc",
    "WEBGL_compressed_texture_s3tc_srgb",
    "WEBGL_debug_renderer_info",
    "WEBGL_debug_shaders",
    "WEBGL_depth_texture",
    "WEBGL_draw_buffers",
    "WEBGL_lose_context",
    "WEBGL_multi_draw",
];

pub const FONTS: [&str; 65] = [
    "Andale Mono",
    "Arial",
    "Arial Black",
    "Arial Hebrew",
    "Arial MT",
    "Arial Narrow",
    "Arial Rounded MT Bold",
    "Arial Unicode MS",
    "Bitstream Vera Sans Mono",
    "Book Antiqua",
    "Bookman Old Style",
    "Calibri",
    "Cambria",
    "Cambria Math",
    "Century",
    "Century Gothic",
    "Century Schoolbook",
    "Comic Sans",
    "Comic Sans MS",
    "Consolas",
    "Courier",
    "Courier New",
    "Garamond",
    "Geneva",
    "Georgia",
    "Helvetica",
    "Helvetica Neue",
    "Impact",
    "Lucida Bright",
    "Lucida Calligraphy",
    "Lucida Console",
    "Lucida Fax",
    "LUCIDA GRANDE",
    "Lucida Handwriting",
    "Lucida Sans",
    "Lucida Sans Typewriter",
    "Lucida Sans Unicode",
    "Microsoft Sans Serif",
    "Monaco",
    "Monotype Corsiva",
    "MS Gothic",
    "MS Outlook",
    "MS PGothic",
    "MS Reference Sans Serif",
    "MS Sans Serif",
    "MS Serif",
    "MYRIAD",
    "MYRIAD PRO",
    "Palatino",
    "Palatino Linotype",
    "Segoe Print",
    "Segoe Script",
    "Segoe UI",
    "Segoe UI Light",
    "Segoe UI Semibold",
    "Segoe UI Symbol",
    "Tahoma",
    "Times",
    "Times New Roman",
    "Times New Roman PS",
    "Trebuchet MS",
    "Verdana",
    "Wingdings",
    "Wingdings 2",
    "Wingdings 3",
];

pub const PLUGINS: [&str; 3] = [
    "Chrome PDF Plugin::Portable Document Format::application/x-google-chrome-pdf~pdf",
    "Chrome PDF Viewer::::application/pdf~pdf",
    "Native Client::::application/x-nacl~,application/x-pnacl~",
];

pub const SCREEN_RESOLUTIONS: [(u32, u32); 13] = [
    (1920, 1080),
    (1920, 1200),
    (2048, 1080),
    (2560, 1440),
    (1366, 768),
    (1440, 900),
    (1536, 864),
    (1680, 1050),
    (1280, 1024),
    (1280, 800),
    (1280, 720),
    (1600, 1200),
    (1600, 900),
];

pub const LANGUAGES: &[&str] = &[
    "af", "af-ZA", "ar", "ar-AE", "ar-BH", "ar-DZ", "ar-EG", "ar-IQ", "ar-JO", "ar-KW", "ar-LB",
    "ar-LY", "ar-MA", "ar-OM", "ar-QA", "ar-SA", "ar-SY", "ar-TN", "ar-YE", "az", "az-AZ", "be",
    "be-BY", "bg", "bg-BG", "bs-BA", "ca", "ca-ES", "cs", "cs-CZ", "cy", "cy-GB", "da", "da-DK",
    "de", "de-AT", "de-CH", "de-DE", "de-LI", "de-LU", "dv", "dv-MV", "el", "el-GR", "en", "en-AU",
    "en-BZ", "en-CA", "en-CB", "en-GB", "en-IE", "en-JM", "en-NZ", "en-PH", "en-TT", "en-US",
    "en-ZA", "en-ZW", "eo", "es", "es-AR", "es-BO", "es-CL", "es-CO", "es-CR", "es-DO", "es-EC",
    "es-ES", "es-GT", "es-HN", "es-MX", "es-NI", "es-PA", "es-PE", "es-PR", "es-PY", "es-SV",
    "es-UY", "es-VE", "et", "et-EE", "eu", "eu-ES", "fa", "fa-IR", "fi", "fi-FI", "fo", "fo-FO",
    "fr", "fr-BE", "fr-CA", "fr-CH", "fr-FR", "fr-LU", "fr-MC", "gl", "gl-ES", "gu", "gu-IN", "he",
    "he-IL", "hi", "hi-IN", "hr", "hr-BA", "hr-HR", "hu", "hu-HU", "hy", "hy-AM", "id", "id-ID",
    "is", "is-IS", "it", "it-CH", "it-IT", "ja", "ja-JP", "ka", "ka-GE", "kk", "kk-KZ", "kn",
    "kn-IN", "ko", "ko-KR", "kok", "kok-IN", "ky", "ky-KG", "lt", "lt-LT", "lv", "lv-LV", "mi",
    "mi-NZ", "mk", "mk-MK", "mn", "mn-MN", "mr", "mr-IN", "ms", "ms-BN", "ms-MY", "mt", "mt-MT",
    "nb", "nb-NO", "nl", "nl-BE", "nl-NL", "nn-NO", "ns", "ns-ZA", "pa", "pa-IN", "pl", "pl-PL",
    "ps", "ps-AR", "pt", "pt-BR", "pt-PT", "qu", "qu-BO", "qu-EC", "qu-PE", "ro", "ro-RO", "ru",
    "ru-RU", "sa", "sa-IN", "se", "se-FI", "se-NO", "se-SE", "sk", "sk-SK", "sl", "sl-SI", "sq",
    "sq-AL", "sr-BA", "sr-SP", "sv", "sv-FI", "sv-SE", "sw", "sw-KE", "syr", "syr-SY", "ta",
    "ta-IN", "te", "te-IN", "th", "th-TH", "tl", "tl-PH", "tn", "tn-ZA", "tr", "tr-TR", "tt",
    "tt-RU", "ts", "uk", "uk-UA", "ur", "ur-PK", "uz", "uz-UZ", "vi", "vi-VN", "xh", "xh-ZA", "zh",
    "zh-CN", "zh-HK", "zh-MO", "zh-SG", "zh-TW", "zu", "zu-ZA",
];

const CANVAS_PREFIX: &str = "canvas winding:yes~canvas fp:data:image/png;base64,";
const ENFORCEMENT_PATH: &str = "v2/1.5.5/enforcement.fbfc14b0d793c6ef8359e0e4b4a91f67.html";
const AUDIO_FINGERPRINT: f64 = 124.04347527516074;

/// One `{"key": .., "value": ..}` entry, the shape shared by the browser-data
/// record and the enhanced fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: Value,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

/// Scalar or list attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<Field>),
}

impl Field {
    fn text(value: impl Into<String>) -> Self {
        Field::Text(value.into())
    }

    fn texts<'a>(values: impl IntoIterator<Item = &'a String>) -> Self {
        Field::List(values.into_iter().cloned().map(Field::Text).collect())
    }

    /// Renders lists with `separator`; scalars as JavaScript would.
    pub fn render(&self, separator: &str) -> String {
        match self {
            Field::List(items) =>
                items
                    .iter()
                    .map(|item| item.to_string())
                    .collect::<Vec<_>>()
                    .join(separator),
            scalar => scalar.to_string(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Text(value) => write!(f, "{}", value),
            Field::Int(value) => write!(f, "{}", value),
            Field::Float(value) if value.fract() == 0.0 => write!(f, "{}", *value as i64),
            Field::Float(value) => write!(f, "{}", value),
            Field::Bool(value) => write!(f, "{}", value),
            Field::List(_) => write!(f, "{}", self.render(",")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub do_not_track: String,
    pub language: String,
    pub color_depth: u32,
    pub pixel_ratio: f64,
    pub screen: (u32, u32),
    pub available_screen: (u32, u32),
    pub timezone_offset: i32,
    pub session_storage: bool,
    pub local_storage: bool,
    pub indexed_db: bool,
    pub add_behavior: bool,
    pub open_database: bool,
    pub cpu_class: String,
    pub platform: String,
    pub canvas: String,
    pub fake_resolution: bool,
    pub fake_os: bool,
    pub fake_browser: bool,
    pub fonts: Vec<String>,
    pub plugins: Vec<String>,
    pub touch: (u32, bool, bool),
    pub hardware_concurrency: u32,
    pub flash: bool,
}

impl Fingerprint {
    pub fn random() -> Self {
        Self::random_with(&mut rand::thread_rng())
    }

    pub fn random_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let screen = *SCREEN_RESOLUTIONS.choose(rng).unwrap_or(&SCREEN_RESOLUTIONS[0]);
        let mut canvas_bytes = [0u8; 128];
        rng.fill(&mut canvas_bytes[..]);

        Self {
            do_not_track: "unknown".to_string(),
            language: LANGUAGES.choose(rng).unwrap_or(&"en-US").to_string(),
            color_depth: if rng.gen_bool(0.5) { 8 } else { 24 },
            pixel_ratio: ((rng.gen::<f64>() * 2.0 + 0.5) * 100.0).round() / 100.0,
            screen,
            available_screen: screen,
            timezone_offset: rng.gen_range(-12..=11) * 60,
            session_storage: rng.gen_bool(0.5),
            local_storage: rng.gen_bool(0.5),
            indexed_db: rng.gen_bool(0.5),
            add_behavior: rng.gen_bool(0.5),
            open_database: rng.gen_bool(0.5),
            cpu_class: "unknown".to_string(),
            platform: "Win32".to_string(),
            canvas: format!("{}{}", CANVAS_PREFIX, STANDARD.encode(canvas_bytes)),
            fake_resolution: false,
            fake_os: false,
            fake_browser: false,
            fonts: thin(rng, &FONTS),
            plugins: thin(rng, &PLUGINS),
            touch: (rng.gen_range(0..=7), rng.gen_bool(0.5), rng.gen_bool(0.5)),
            hardware_concurrency: 1u32 << rng.gen_range(0u32..=5),
            flash: false,
        }
    }

    /// Attributes in wire order under their short keys.
    pub fn fields(&self) -> Vec<(&'static str, Field)> {
        vec![
            ("DNT", Field::text(&self.do_not_track)),
            ("L", Field::text(&self.language)),
            ("D", Field::Int(self.color_depth as i64)),
            ("PR", Field::Float(self.pixel_ratio)),
            ("S", Field::List(vec![Field::Int(self.screen.0 as i64), Field::Int(self.screen.1 as i64)])),
            (
                "AS",
                Field::List(
                    vec![
                        Field::Int(self.available_screen.0 as i64),
                        Field::Int(self.available_screen.1 as i64)
                    ]
                ),
            ),
            ("TO", Field::Int(self.timezone_offset as i64)),
            ("SS", Field::Bool(self.session_storage)),
            ("LS", Field::Bool(self.local_storage)),
            ("IDB", Field::Bool(self.indexed_db)),
            ("B", Field::Bool(self.add_behavior)),
            ("ODB", Field::Bool(self.open_database)),
            ("CPUC", Field::text(&self.cpu_class)),
            ("PK", Field::text(&self.platform)),
            ("CFP", Field::text(&self.canvas)),
            ("FR", Field::Bool(self.fake_resolution)),
            ("FOS", Field::Bool(self.fake_os)),
            ("FB", Field::Bool(self.fake_browser)),
            ("JSF", Field::texts(&self.fonts)),
            ("P", Field::texts(&self.plugins)),
            (
                "T",
                Field::List(
                    vec![Field::Int(self.touch.0 as i64), Field::Bool(self.touch.1), Field::Bool(self.touch.2)]
                ),
            ),
            ("H", Field::Int(self.hardware_concurrency as i64)),
            ("SWF", Field::Bool(self.flash)),
        ]
    }
}

fn thin<R: Rng + ?Sized>(rng: &mut R, items: &[&str]) -> Vec<String> {
    items
        .iter()
        .filter(|_| rng.gen_bool(0.5))
        .map(|item| item.to_string())
        .collect()
}

/// Flat checksum input: every value, lists joined by `;`, fields by `~~~`.
pub fn prepare_f(fingerprint: &Fingerprint) -> String {
    fingerprint
        .fields()
        .iter()
        .map(|(_, field)| field.render(";"))
        .collect::<Vec<_>>()
        .join("~~~")
}

/// `KEY:value` list. The canvas probe is replaced by its hash and plugins are
/// reduced to their names.
pub fn prepare_fe(fingerprint: &Fingerprint) -> Vec<String> {
    fingerprint
        .fields()
        .into_iter()
        .map(|(key, field)| {
            match key {
                "CFP" => format!("{}:{}", key, cfp_hash(&field.render(","))),
                "P" => {
                    let names = fingerprint.plugins
                        .iter()
                        .map(|plugin| plugin.split("::").next().unwrap_or(plugin.as_str()))
                        .collect::<Vec<_>>()
                        .join(",");
                    format!("{}:{}", key, names)
                }
                _ => format!("{}:{}", key, field.render(",")),
            }
        })
        .collect()
}

/// Java-style string hash (`h = h * 31 + c`) truncated to 32 bits, unsigned.
pub fn cfp_hash(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    let hash = value
        .chars()
        .fold(0u32, |acc, c| acc.wrapping_mul(31).wrapping_add(c as u32));
    hash.to_string()
}

/// Site parameters that leak into the enhanced fingerprint.
#[derive(Debug, Clone)]
pub struct ChallengeSite {
    pub surl: String,
    pub public_key: String,
    pub site: Option<String>,
    pub language: Option<String>,
}

pub fn enhanced_fingerprint(fingerprint: &Fingerprint, user_agent: &str, site: &ChallengeSite) -> Vec<KeyValue> {
    enhanced_fingerprint_with(&mut rand::thread_rng(), fingerprint, user_agent, site)
}

pub fn enhanced_fingerprint_with<R: Rng + ?Sized>(
    rng: &mut R,
    fingerprint: &Fingerprint,
    user_agent: &str,
    site: &ChallengeSite
) -> Vec<KeyValue> {
    let extensions = thin(rng, &WEBGL_EXTENSIONS).join(";");
    let mut webgl: Vec<(&str, String)> = vec![
        ("webgl_extensions", extensions.clone()),
        ("webgl_extensions_hash", x64hash128(&extensions, 0)),
        ("webgl_renderer", "WebKit WebGL".to_string()),
        ("webgl_vendor", "WebKit".to_string()),
        ("webgl_version", "WebGL 1.0 (OpenGL ES 2.0 Chromium)".to_string()),
        ("webgl_shading_language_version", "WebGL GLSL ES 1.0 (OpenGL ES GLSL ES 1.0 Chromium)".to_string()),
        ("webgl_aliased_line_width_range", "[1, 1]".to_string()),
        ("webgl_aliased_point_size_range", "[1, 1023]".to_string()),
        ("webgl_antialiasing", "yes".to_string()),
        ("webgl_bits", "8,8,24,8,8,0".to_string()),
        ("webgl_max_params", "16,64,16384,4096,8192,32,8192,31,16,32,4096".to_string()),
        ("webgl_max_viewport_dims", "[8192, 8192]".to_string()),
        ("webgl_unmasked_vendor", "Google Inc. (Google)".to_string()),
        (
            "webgl_unmasked_renderer",
            "ANGLE (Google, Vulkan 1.3.0 (SwiftShader Device (Subzero) (0x0000C0DE)), SwiftShader driver)".to_string(),
        ),
        ("webgl_vsf_params", "23,127,127,23,127,127,23,127,127".to_string()),
        ("webgl_vsi_params", "0,31,30,0,31,30,0,31,30".to_string()),
        ("webgl_fsf_params", "23,127,127,23,127,127,23,127,127".to_string()),
        ("webgl_fsi_params", "0,31,30,0,31,30,0,31,30".to_string()),
    ];
    let webgl_hash = x64hash128(
        &webgl
            .iter()
            .map(|(_, value)| value.as_str())
            .collect::<Vec<_>>()
            .join(","),
        0
    );
    webgl.push(("webgl_hash_webgl", webgl_hash));

    let surl = site.surl.trim_end_matches('/');
    let site_url = site.site.clone().unwrap_or_else(|| "https://www.roblox.com/".to_string());
    // Heights take the first screen value, widths the second.
    let (first, second) = fingerprint.screen;
    let audio = AUDIO_FINGERPRINT + rng.gen_range(-0.0005..0.0005);

    let mut entries: Vec<KeyValue> = webgl
        .into_iter()
        .map(|(key, value)| KeyValue::new(key, value))
        .collect();
    entries.extend([
        KeyValue::new("user_agent_data_brands", "Chromium,Google Chrome,Not=A?Brand"),
        KeyValue::new("user_agent_data_mobile", Value::Null),
        KeyValue::new("navigator_connection_downlink", Value::Null),
        KeyValue::new("navigator_connection_downlink_max", Value::Null),
        KeyValue::new("network_info_rtt", Value::Null),
        KeyValue::new("network_info_save_data", false),
        KeyValue::new("network_info_rtt_type", Value::Null),
        KeyValue::new("screen_pixel_depth", fingerprint.color_depth),
        KeyValue::new("navigator_device_memory", 0.5),
        KeyValue::new("navigator_languages", fingerprint.language.as_str()),
        KeyValue::new("window_inner_width", second),
        KeyValue::new("window_inner_height", first),
        KeyValue::new("window_outer_width", second),
        KeyValue::new("window_outer_height", first),
        KeyValue::new("browser_detection_firefox", matches_browser(&FIREFOX, user_agent)),
        KeyValue::new("browser_detection_brave", matches_browser(&BRAVE, user_agent)),
        KeyValue::new(
            "audio_codecs",
            r#"{"ogg":"probably","mp3":"probably","wav":"probably","m4a":"maybe","aac":"probably"}"#
        ),
        KeyValue::new(
            "video_codecs",
            r#"{"ogg":"probably","h264":"probably","webm":"probably","mpeg4v":"","mpeg4a":"","theora":""}"#
        ),
        KeyValue::new("media_query_dark_mode", rng.gen::<f64>() > 0.9),
        KeyValue::new("headless_browser_phantom", false),
        KeyValue::new("headless_browser_selenium", false),
        KeyValue::new("headless_browser_nightmare_js", false),
        KeyValue::new("document__referrer", site_url.as_str()),
        KeyValue::new("window__ancestor_origins", json!([site_url])),
        KeyValue::new("window__tree_index", json!([0])),
        KeyValue::new("window__tree_structure", "[[]]"),
        KeyValue::new("window__location_href", format!("{}/{}#{}", surl, ENFORCEMENT_PATH, site.public_key)),
        KeyValue::new("client_config__sitedata_location_href", site_url.as_str()),
        KeyValue::new("client_config__surl", surl),
        KeyValue::new("client_config__language", site.language.clone().map_or(Value::Null, Value::String)),
        KeyValue::new("navigator_battery_charging", true),
        KeyValue::new("audio_fingerprint", audio.to_string()),
    ]);
    entries
}

static FIREFOX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"Firefox/\d+").ok());
static BRAVE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"Brave/\d+").ok());

fn matches_browser(pattern: &Lazy<Option<Regex>>, user_agent: &str) -> bool {
    pattern
        .as_ref()
        .map_or(false, |re| re.is_match(user_agent))
}
