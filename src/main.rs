// Thin wiring binary: runs one backtest over a CSV bar series and prints the
// resulting report. CLI ergonomics (argument parsing, multi-symbol batches)
// are out of scope; this exists to exercise the engine end-to-end.

use chrono::{NaiveDate, TimeZone, Utc};

use zerodte_engine::backtesting::{persist_trades, BacktestRunner};
use zerodte_engine::config::{EngineConfig, FeesConfig, RiskConfig, SlippageConfig, StopsConfig};
use zerodte_engine::market_data::calendar::VecCalendarProvider;
use zerodte_engine::market_data::csv_loader::CsvBarProvider;
use zerodte_engine::market_data::providers::BarProvider;
use zerodte_engine::quoting::{IvProxySeries, QuoteSynthesizer, QuoteSynthesizerConfig};
use zerodte_engine::regime::RegimeWeights;
use zerodte_engine::store::TradeLogStore;
use zerodte_engine::strategies::spreads::SpreadBuilderConfig;
use zerodte_engine::backtesting::ExitConfig;

fn demo_config() -> EngineConfig {
    EngineConfig {
        start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        underlying: "XSP".to_string(),
        timezone: "America/New_York".to_string(),
        rth_only: true,
        cadence_seconds: 3600,
        no_new_risk_minutes_to_close: 60,
        slippage: SlippageConfig {
            entry_half_spread_ticks: 1.0,
            exit_half_spread_ticks: 1.0,
            tick_value: 0.05,
            late_session_extra_ticks: 1.0,
        },
        fees: FeesConfig { commission_per_contract: 0.65, exchange_fees_per_contract: 0.10 },
        risk: RiskConfig { daily_loss_stop: 500.0, max_concurrent_per_side: 1 },
        stops: StopsConfig::default(),
        seed: 42,
    }
}

fn bars_ts(bars: &CsvBarProvider) -> Vec<chrono::DateTime<Utc>> {
    let day = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
    let mut timestamps = Vec::new();
    let mut t = day.and_hms_opt(14, 30, 0).unwrap();
    let end = day.and_hms_opt(21, 0, 0).unwrap();
    while t <= end {
        let ts = Utc.from_utc_datetime(&t);
        if bars.spot(ts) > 0.0 {
            timestamps.push(ts);
        }
        t += chrono::Duration::minutes(30);
    }
    timestamps
}

#[tokio::main]
async fn main() {
    env_logger::init();

    log::info!("starting 0DTE backtest demo run");

    let bars = match CsvBarProvider::load("tesla_one_year.csv") {
        Ok(provider) => provider,
        Err(e) => {
            log::warn!("falling back to a single synthetic bar: {e}");
            let ts = Utc.with_ymd_and_hms(2024, 2, 1, 21, 0, 0).unwrap();
            CsvBarProvider::from_bars(vec![zerodte_engine::market_data::providers::Bar {
                timestamp: ts,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1_000_000.0,
            }])
        }
    };

    let mut iv_proxies = IvProxySeries::new();
    let day = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
    iv_proxies.insert_short(day, 16.0);
    iv_proxies.insert_thirty(day, 15.0);

    let calendar = VecCalendarProvider::default();
    let synth = QuoteSynthesizer::new(&bars, iv_proxies, QuoteSynthesizerConfig::default());
    let config = demo_config();

    let runner = BacktestRunner {
        bar_provider: &bars,
        calendar: &calendar,
        options: &synth,
        config: &config,
        regime_weights: RegimeWeights::default(),
        builder_config: SpreadBuilderConfig::default(),
        exit_config: ExitConfig::from(&config),
        fill_profile: Default::default(),
    };

    let timestamps = bars_ts(&bars);
    let report = runner.run(&timestamps);

    log::info!(
        "run complete: {} trades, net_pnl={:.2}, win_rate={:.1}%, sharpe={:.2}, max_drawdown={:.2}",
        report.trades.len(),
        report.net_pnl,
        report.win_rate * 100.0,
        report.sharpe,
        report.max_drawdown,
    );

    let mut errors = report.errors.clone();
    if !report.trades.is_empty() {
        match TradeLogStore::open_for_day(std::path::Path::new("trade_logs"), day).await {
            Ok(store) => persist_trades(&store, &config.underlying, &report.trades, &mut errors).await,
            Err(e) => errors.record(&e),
        }
    }

    if errors.total() > 0 {
        log::error!("run finished with {} caught error(s): {:?}", errors.total(), errors);
        std::process::exit(1);
    }
}
