use std::{env, error::Error, fs, path::Path};

use serde::Deserialize;

fn default_mqtt_port() -> u16 {
    1883
}

fn default_publish_interval() -> u16 {
    10
}

fn default_wifi_retry_ms() -> u32 {
    500
}

fn default_mqtt_retry_ms() -> u32 {
    2000
}

fn default_gps_retry_ms() -> u32 {
    3000
}

fn default_probe_port() -> u16 {
    8080
}

#[derive(Deserialize)]
struct RawConfig {
    device_id: String,
    role: String,
    wifi_ssid: String,
    wifi_psk: String,
    mqtt_hostname: String,
    #[serde(default = "default_mqtt_port")]
    mqtt_port: u16,
    #[serde(default)]
    mqtt_client_id: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    #[serde(default)]
    security: Option<String>,
    tls_ca: Option<String>,
    channel_id: String,
    layout: String,
    #[serde(default)]
    key_style: Option<String>,
    #[serde(default)]
    display: Option<String>,
    #[serde(default = "default_publish_interval")]
    publish_interval_seconds: u16,
    #[serde(default = "default_wifi_retry_ms")]
    wifi_retry_ms: u32,
    #[serde(default = "default_mqtt_retry_ms")]
    mqtt_retry_ms: u32,
    #[serde(default = "default_gps_retry_ms")]
    gps_retry_ms: u32,
    retry_limit: Option<u32>,
    #[serde(default)]
    gps_enabled: bool,
    reference_latitude: f64,
    reference_longitude: f64,
    #[serde(default)]
    frame: Option<String>,
    #[serde(default)]
    utc_offset_hours: i8,
    probe_hostname: Option<String>,
    #[serde(default = "default_probe_port")]
    probe_port: u16,
    #[serde(default)]
    download_path: String,
    #[serde(default)]
    upload_path: String,
}

// Maps a cfg.toml string onto the variant of one of the config enums.
fn variant(
    field: &str,
    value: Option<&str>,
    default: &str,
    choices: &[(&str, &str)],
) -> Result<String, Box<dyn Error>> {
    let value = value.unwrap_or(default).to_ascii_lowercase();
    choices
        .iter()
        .find(|(name, _)| *name == value)
        .map(|(_, path)| path.to_string())
        .ok_or_else(|| format!("cfg.toml: unsupported {} {:?}", field, value).into())
}

fn main() -> Result<(), Box<dyn Error>> {
    // Tell Cargo to rerun if toml changes
    println!("cargo:rerun-if-changed=cfg.toml");
    println!("cargo:rerun-if-changed=cfg.toml.example");

    let source = if Path::new("cfg.toml").exists() {
        "cfg.toml"
    } else {
        println!("cargo:warning=cfg.toml not found, using cfg.toml.example");
        "cfg.toml.example"
    };

    // Read and parse
    let toml_str = fs::read_to_string(source)?;
    let raw: RawConfig = toml::from_str(&toml_str)?;

    let role = variant(
        "role",
        Some(&raw.role),
        "publisher",
        &[("publisher", "Role::Publisher"), ("consumer", "Role::Consumer")],
    )?;
    let security = variant(
        "security",
        raw.security.as_deref(),
        "plain",
        &[("plain", "Security::Plain"), ("tls", "Security::Tls")],
    )?;
    let layout = variant(
        "layout",
        Some(&raw.layout),
        "survey",
        &[
            ("link-quality", "Layout::LinkQuality"),
            ("survey", "Layout::Survey"),
            ("position", "Layout::Position"),
        ],
    )?;
    let key_style = variant(
        "key_style",
        raw.key_style.as_deref(),
        "thingspeak",
        &[("thingspeak", "KeyStyle::Positional"), ("tagged", "KeyStyle::Tagged")],
    )?;
    let display = variant(
        "display",
        raw.display.as_deref(),
        "none",
        &[
            ("none", "DisplayKind::None"),
            ("oled", "DisplayKind::Oled"),
            ("tft", "DisplayKind::Tft"),
        ],
    )?;
    let frame = variant(
        "frame",
        raw.frame.as_deref(),
        "spherical",
        &[
            ("spherical", "FrameModel::Spherical"),
            ("surveyed", "FrameModel::Surveyed"),
        ],
    )?;

    // Generate Rust code
    let out_dir = env::var("OUT_DIR")?;
    let dest_path = Path::new(&out_dir).join("config.rs");
    let code = format!(
        r#"
        pub const CONFIG: Config = Config {{
            device_id: {device:?},
            role: {role},
            wifi_ssid: {ssid:?},
            wifi_psk: {psk:?},
            mqtt_hostname: {mh:?},
            mqtt_port: {mp},
            mqtt_client_id: {mc:?},
            mqtt_username: {mu:?},
            mqtt_password: {mpw:?},
            security: {security},
            tls_ca: {ca:?},
            channel_id: {channel:?},
            layout: {layout},
            key_style: {key_style},
            display: {display},
            publish_interval_seconds: {intv},
            wifi_retry_ms: {wr},
            mqtt_retry_ms: {mr},
            gps_retry_ms: {gr},
            retry_limit: {limit:?},
            gps_enabled: {gps},
            reference_latitude: {rlat:?},
            reference_longitude: {rlon:?},
            frame: {frame},
            utc_offset_hours: {utc},
            probe_hostname: {ph:?},
            probe_port: {pp},
            download_path: {dp:?},
            upload_path: {up:?},
        }};
    "#,
        device = raw.device_id,
        role = role,
        ssid = raw.wifi_ssid,
        psk = raw.wifi_psk,
        mh = raw.mqtt_hostname,
        mp = raw.mqtt_port,
        mc = raw.mqtt_client_id,
        mu = raw.mqtt_username,
        mpw = raw.mqtt_password,
        security = security,
        ca = raw.tls_ca,
        channel = raw.channel_id,
        layout = layout,
        key_style = key_style,
        display = display,
        intv = raw.publish_interval_seconds,
        wr = raw.wifi_retry_ms,
        mr = raw.mqtt_retry_ms,
        gr = raw.gps_retry_ms,
        limit = raw.retry_limit,
        gps = raw.gps_enabled,
        rlat = raw.reference_latitude,
        rlon = raw.reference_longitude,
        frame = frame,
        utc = raw.utc_offset_hours,
        ph = raw.probe_hostname,
        pp = raw.probe_port,
        dp = raw.download_path,
        up = raw.upload_path,
    );

    fs::write(dest_path, code)?;
    Ok(())
}
