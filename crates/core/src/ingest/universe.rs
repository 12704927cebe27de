use crate::ingest::types::Listing;
use std::collections::HashSet;

const CHILEAN_STOCKS: &[(&str, &[(&str, &str)])] = &[
    (
        "Banca",
        &[
            ("BSANTANDER.SN", "Banco Santander Chile"),
            ("BCI.SN", "Banco de Crédito e Inversiones"),
            ("CHILE.SN", "Banco de Chile"),
            ("BICECORP.SN", "Bice Corp"),
            ("ITAU.SN", "Itaú Corpbanca"),
        ],
    ),
    (
        "Retail",
        &[
            ("FALABELLA.SN", "Falabella"),
            ("RIPLEY.SN", "Ripley"),
            ("CENCOSUD.SN", "Cencosud"),
            ("FORUS.SN", "Forus"),
            ("SMU.SN", "SMU"),
            ("TRICOT.SN", "Tricot"),
        ],
    ),
    (
        "Energía y Utilities",
        &[
            ("ENELCHILE.SN", "Enel Chile"),
            ("COLBUN.SN", "Colbún"),
            ("AGUAS-A.SN", "Aguas Andinas"),
            ("GASCO.SN", "Gasco"),
            ("COPEC.SN", "Empresas Copec"),
            ("ECL.SN", "Engie Chile"),
        ],
    ),
    (
        "Embotellados",
        &[
            ("EMBONOR-B.SN", "Embotelladora Andina"),
            ("CONCHATORO.SN", "Concha y Toro"),
            ("CCU.SN", "CCU"),
        ],
    ),
    (
        "AFP",
        &[
            ("HABITAT.SN", "AFP Habitat"),
            ("PROVIDA.SN", "AFP Provida"),
            ("PLANVITAL.SN", "AFP PlanVital"),
        ],
    ),
    (
        "Inmobiliario",
        &[
            ("CENCOMALLS.SN", "Cencosud Shopping"),
            ("MALLPLAZA.SN", "Mall Plaza"),
            ("PARAUCO.SN", "Parauco"),
        ],
    ),
    ("Transporte", &[("LTM.SN", "LATAM Airlines")]),
    ("Minería", &[("SQM-B.SN", "SQM")]),
    ("Forestal", &[("CMPC.SN", "CMPC")]),
];

pub const UNKNOWN_SECTOR: &str = "Otros";

/// Santiago exchange universe, one entry per ticker, in sector order.
pub fn chilean_universe() -> Vec<Listing> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (sector, stocks) in CHILEAN_STOCKS {
        for (ticker, name) in *stocks {
            if seen.insert(*ticker) {
                out.push(Listing {
                    ticker: ticker.to_string(),
                    name: name.to_string(),
                    sector: sector.to_string(),
                });
            }
        }
    }
    out
}

pub fn sector_for(ticker: &str) -> &'static str {
    CHILEAN_STOCKS
        .iter()
        .find(|(_, stocks)| stocks.iter().any(|(t, _)| t.eq_ignore_ascii_case(ticker)))
        .map(|(sector, _)| *sector)
        .unwrap_or(UNKNOWN_SECTOR)
}
