use super::*;

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            max_attempts: 3,
            retry_delay_secs: 3,
            user_agent: format!("powermap/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            failure_limit: 3,
            no_data_limit: 20,
            backoff_minutes: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/powermap.log".to_string(),
            backup_count: 5,
            console_output: true,
            file_output: true,
            json_format: false,
        }
    }
}

/// The ten regional utilities with published real-time demand CSVs
fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig::new(
            "Hokkaido Electric",
            "http://denkiyoho.hepco.co.jp/data/juyo_hokkaidou.csv",
            5,
            43.061531,
            141.357672,
        ),
        SourceConfig::new(
            "Tohoku Electric",
            "http://setsuden.tohoku-epco.co.jp/common/demand/juyo_02_[yyyyMMdd].csv",
            5,
            38.265633,
            140.878367,
        ),
        SourceConfig::new(
            "TEPCO",
            "http://www.tepco.co.jp/forecast/html/images/juyo-j.csv",
            5,
            35.670214,
            139.758420,
        ),
        SourceConfig::new(
            "Hokuriku Electric",
            "http://www.rikuden.co.jp/denki-yoho/csv/juyo_05_[yyyyMMdd].csv",
            5,
            36.702751,
            137.215333,
        ),
        SourceConfig::new(
            "Chubu Electric",
            "http://denki-yoho.chuden.jp/denki_yoho_content_data/juyo_cepco003.csv",
            5,
            35.169967,
            136.913677,
        ),
        SourceConfig::new(
            "Kansai Electric",
            "http://www.kepco.co.jp/yamasou/juyo1_kansai.csv",
            5,
            34.692641,
            135.492568,
        ),
        SourceConfig::new(
            "Chugoku Electric",
            "http://www.energia.co.jp/jukyuu/sys/juyo_07_[yyyyMMdd].csv",
            5,
            34.387803,
            132.455922,
        ),
        SourceConfig::new(
            "Shikoku Electric",
            "http://www.yonden.co.jp/denkiyoho/juyo_shikoku.csv",
            5,
            34.347726,
            134.050183,
        ),
        SourceConfig::new(
            "Kyushu Electric",
            "http://www.kyuden.co.jp/power_usages/csv/juyo-hourly-[yyyyMMdd].csv",
            5,
            33.583509,
            130.404586,
        ),
        SourceConfig::new(
            "Okinawa Electric",
            "http://www.okiden.co.jp/denki/juyo_10_[yyyyMMdd].csv",
            5,
            26.270959,
            127.716202,
        ),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: "Asia/Tokyo".to_string(),
            fetch: FetchConfig::default(),
            schedule: ScheduleConfig::default(),
            logging: LoggingConfig::default(),
            sources: default_sources(),
        }
    }
}
