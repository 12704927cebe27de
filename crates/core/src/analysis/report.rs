use crate::analysis::distribution::risk_label;
use crate::analysis::reconcile::format_amount;
use crate::analysis::AnalysisRun;
use crate::domain::recommendation::DistributionSource;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use std::fmt::Write;

const TOP_ITEMS: usize = 10;

const MONTHS: [&str; 12] = [
    "ENERO", "FEBRERO", "MARZO", "ABRIL", "MAYO", "JUNIO", "JULIO", "AGOSTO", "SEPTIEMBRE",
    "OCTUBRE", "NOVIEMBRE", "DICIEMBRE",
];

pub fn report_file_name(as_of_date: NaiveDate) -> String {
    format!("reporte_mensual_{}.txt", as_of_date.format("%Y_%m"))
}

/// Plain-text monthly report for one run.
pub fn render_monthly_report(run: &AnalysisRun, generated_at: NaiveDateTime) -> String {
    let rec = &run.recommendation;
    let summary = &run.market_summary;
    let month = MONTHS[rec.as_of_date.month0() as usize];
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "REPORTE MENSUAL DE INVERSIÓN - {month} {}", rec.as_of_date.year());
    let _ = writeln!(out, "{}", "=".repeat(64));
    let _ = writeln!(out);
    let _ = writeln!(out, "RESUMEN EJECUTIVO");
    let _ = writeln!(out, "- Fecha del análisis: {}", rec.as_of_date.format("%d/%m/%Y"));
    let _ = writeln!(out, "- Presupuesto: ${} CLP", format_amount(rec.budget));
    let _ = writeln!(out, "- Perfil de riesgo: {}", risk_label(rec.risk_level));
    let _ = writeln!(out, "- Empresas analizadas: {}", summary.total_securities);
    let _ = writeln!(out, "- Empresas recomendadas: {}", rec.items.len());
    let _ = writeln!(out);

    match &run.distribution.source {
        DistributionSource::Llm { provider, corrected } => {
            let _ = writeln!(out, "ANÁLISIS CON IA ({provider})");
            let _ = writeln!(out, "{}", run.analysis.trim());
            let _ = writeln!(out);
            let _ = writeln!(out, "DISTRIBUCIÓN RECOMENDADA POR IA");
            if *corrected {
                let _ = writeln!(out, "(montos ajustados al presupuesto)");
            }
        }
        DistributionSource::Computed { .. } => {
            let _ = writeln!(out, "ANÁLISIS AUTOMÁTICO");
            let _ = writeln!(out, "{}", run.analysis.trim());
            let _ = writeln!(out);
            let _ = writeln!(out, "DISTRIBUCIÓN CALCULADA");
        }
    }
    let _ = writeln!(out, "{}", run.distribution.text.trim());
    let _ = writeln!(out);

    let _ = writeln!(out, "TOP {TOP_ITEMS} RECOMENDACIONES");
    for (i, item) in rec.items.iter().take(TOP_ITEMS).enumerate() {
        let _ = writeln!(out, "{:2}. {} ({})", i + 1, item.name, item.ticker);
        let _ = writeln!(out, "    Sector: {}", item.sector);
        let _ = writeln!(
            out,
            "    Inversión sugerida: ${} CLP ({:.2}%)",
            format_amount(item.amount),
            item.percentage
        );
        let _ = writeln!(out, "    Score: {:.4}", item.score);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "DISTRIBUCIÓN POR SECTORES");
    for sector in &rec.sectors {
        let _ = writeln!(
            out,
            "- {}: ${} CLP ({:.1}%)",
            sector.sector,
            format_amount(sector.amount),
            sector.percentage
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "ESTADO DEL MERCADO");
    let _ = writeln!(
        out,
        "- Variación promedio 6M: {}",
        percent(summary.average_change_6m)
    );
    let _ = writeln!(
        out,
        "- Dividend yield promedio: {}",
        percent(summary.average_dividend_yield)
    );
    let _ = writeln!(out, "- Empresas con dividendos: {}", summary.dividend_payers);
    let _ = writeln!(out);
    let _ = writeln!(out, "MEJORES PERFORMERS (6 meses)");
    for (i, h) in summary.top_performers.iter().enumerate() {
        let _ = writeln!(out, "{}. {}: {:.1}%", i + 1, h.name, h.value * 100.0);
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "MEJORES DIVIDENDOS");
    for (i, h) in summary.top_dividend_payers.iter().enumerate() {
        let _ = writeln!(out, "{}. {}: {:.2}%", i + 1, h.name, h.value * 100.0);
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Este análisis es informativo y no constituye asesoría financiera profesional."
    );
    let _ = writeln!(
        out,
        "Reporte generado el {}",
        generated_at.format("%d/%m/%Y a las %H:%M")
    );
    out
}

fn percent(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}%", v * 100.0))
        .unwrap_or_else(|| "N/A".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{recommend, score_batch};
    use crate::config::AnalysisConfig;
    use crate::domain::recommendation::{Distribution, DistributionFallback};
    use crate::domain::security::SecurityMetrics;
    use chrono::{TimeZone, Utc};

    #[test]
    fn file_name_uses_year_and_month() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(report_file_name(date), "reporte_mensual_2026_03.txt");
    }

    #[test]
    fn report_lists_positions_and_sectors() {
        let batch: Vec<SecurityMetrics> = (0..6)
            .map(|i| {
                let mut s = SecurityMetrics::new(format!("T{i}.SN"), format!("Empresa {i}"), "Banca");
                s.fundamentals.roe = Some(0.05 * (i + 1) as f64);
                s.fundamentals.dividend_yield = Some(0.02);
                s
            })
            .collect();
        let config = AnalysisConfig {
            budget: 200_000,
            ..AnalysisConfig::default()
        };
        let outcome = score_batch(&batch, &config);
        let as_of = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let rec = recommend(&outcome, &config, as_of, Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap())
            .unwrap();
        let run = AnalysisRun {
            distribution: Distribution {
                text: crate::analysis::distribution::render_distribution(&rec),
                source: DistributionSource::Computed {
                    reason: DistributionFallback::NoClient,
                },
            },
            recommendation: rec,
            scored: outcome.records,
            weights: outcome.weights,
            market_summary: crate::analysis::summary::market_summary(&batch),
            analysis: "Resumen.".to_string(),
        };

        let text = render_monthly_report(&run, as_of.and_hms_opt(9, 30, 0).unwrap());
        assert!(text.starts_with("REPORTE MENSUAL DE INVERSIÓN - MARZO 2026"));
        assert!(text.contains("- Presupuesto: $200,000 CLP"));
        assert!(text.contains("- Banca: $200,000 CLP (100.0%)"));
        assert!(text.contains("DISTRIBUCIÓN CALCULADA"));
        assert!(text.contains("Reporte generado el 02/03/2026 a las 09:30"));
    }
}
