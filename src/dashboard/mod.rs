//! Analytics dashboard page
//!
//! A single HTML document with three Chart.js charts (views per page,
//! browser engines, countries), rendered from an [`AnalyticsSnapshot`].

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

use crate::analytics::AnalyticsSnapshot;

/// Process figures shown next to the counters
#[derive(Debug, Clone, Serialize)]
pub struct ServerStats {
    pub cpu_cores: usize,
    /// Resident memory of this process; `None` where the platform does not report it
    pub memory_bytes: Option<u64>,
    pub uptime_secs: u64,
}

impl ServerStats {
    pub fn collect(uptime: Duration) -> Self {
        Self {
            cpu_cores: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            memory_bytes: process_memory(),
            uptime_secs: uptime.as_secs(),
        }
    }
}

fn process_memory() -> Option<u64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_memory(),
    );
    system.process(pid).map(|process| process.memory())
}

fn format_memory(bytes: Option<u64>) -> String {
    match bytes {
        Some(bytes) => format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0)),
        None => "n/a".to_string(),
    }
}

/// Labels and values of a chart as JSON arrays, safe to embed in `<script>`
fn chart_data(map: &BTreeMap<String, u64>) -> (String, String) {
    let labels: Vec<&str> = map.keys().map(String::as_str).collect();
    let counts: Vec<u64> = map.values().copied().collect();
    (script_json(&labels), script_json(&counts))
}

fn script_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "[]".to_string())
        .replace("</", "<\\/")
}

fn format_uptime(secs: u64) -> String {
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m {seconds}s")
    }
}

pub fn render(snapshot: &AnalyticsSnapshot, stats: &ServerStats) -> String {
    let (page_labels, page_counts) = chart_data(&snapshot.page_views);
    let (engine_labels, engine_counts) = chart_data(&snapshot.browser_engines);
    let (country_labels, country_counts) = chart_data(&snapshot.countries);

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
	<meta charset="utf-8">
	<title>GMD Analytics</title>
	<script src="https://cdn.jsdelivr.net/npm/chart.js"></script>
	<style>
		body {{ font-family: sans-serif; background: #181c20; color: #eee; margin: 0; padding: 0; }}
		.container {{ max-width: 1200px; margin: 40px auto; background: #23272b; border-radius: 10px; padding: 32px; box-shadow: 0 2px 16px #0004; }}
		h1 {{ text-align: center; }}
		.stats {{ margin: 24px 0; font-size: 1.2em; }}
		canvas {{ background: #fff; border-radius: 8px; margin-bottom: 32px; }}
		.footer {{ text-align: center; margin-top: 32px; color: #888; font-size: 0.9em; }}
		.charts {{ display: flex; flex-wrap: nowrap; gap: 24px; justify-content: center; }}
		.chart-block {{ flex: 1 1 0; min-width: 0; }}
		@media (max-width: 1000px) {{
			.charts {{ flex-wrap: wrap; }}
			.chart-block {{ min-width: 320px; }}
		}}
	</style>
</head>
<body>
	<div class="container">
		<h1>GMD Analytics</h1>
		<div class="stats">
			<b>Total Views:</b> {total}<br>
			<b>CPU Cores:</b> {cpu}<br>
			<b>Memory Usage:</b> {memory}<br>
			<b>Uptime:</b> {uptime}
		</div>
		<div class="charts">
			<div class="chart-block"><canvas id="viewsChart" width="400" height="250"></canvas></div>
			<div class="chart-block"><canvas id="browserChart" width="400" height="250"></canvas></div>
			<div class="chart-block"><canvas id="countryChart" width="400" height="250"></canvas></div>
		</div>
		<div class="footer">GMD Analytics &mdash; views are deduplicated per visitor and page over a short cooldown</div>
	</div>
	<script>
		const palette = ['255, 99, 132', '255, 205, 86', '75, 192, 192', '54, 162, 235', '153, 102, 255', '201, 203, 207'];
		const fill = (a) => palette.map((c) => `rgba(${{c}}, ${{a}})`);
		const roundOptions = {{ plugins: {{ legend: {{ position: 'bottom' }} }}, responsive: true, maintainAspectRatio: false }};

		new Chart(document.getElementById('viewsChart').getContext('2d'), {{
			type: 'bar',
			data: {{
				labels: {page_labels},
				datasets: [{{ label: 'Page Views', data: {page_counts}, backgroundColor: 'rgba(54, 162, 235, 0.5)', borderColor: 'rgba(54, 162, 235, 1)', borderWidth: 2 }}]
			}},
			options: {{ scales: {{ y: {{ beginAtZero: true }} }}, responsive: true, maintainAspectRatio: false }}
		}});

		new Chart(document.getElementById('browserChart').getContext('2d'), {{
			type: 'pie',
			data: {{
				labels: {engine_labels},
				datasets: [{{ label: 'Browser Engines', data: {engine_counts}, backgroundColor: fill(0.5), borderColor: fill(1), borderWidth: 2 }}]
			}},
			options: roundOptions
		}});

		new Chart(document.getElementById('countryChart').getContext('2d'), {{
			type: 'doughnut',
			data: {{
				labels: {country_labels},
				datasets: [{{ label: 'Countries', data: {country_counts}, backgroundColor: fill(0.5), borderColor: fill(1), borderWidth: 2 }}]
			}},
			options: roundOptions
		}});
	</script>
</body>
</html>
"#,
        total = snapshot.total_views,
        cpu = stats.cpu_cores,
        memory = format_memory(stats.memory_bytes),
        uptime = format_uptime(stats.uptime_secs),
    )
}
