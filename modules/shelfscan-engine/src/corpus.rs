//! Page registry for the sample product corpus.
//!
//! The HTML files live in the data directory (see
//! `shelfscan_common::config::data_dir`); each entry pairs a filename with
//! the page's canonical URL when one is known. The URL doubles as the
//! product-id key and the base for relative image resolution.

/// One corpus page: filename plus canonical URL, when the page embeds one.
pub struct CorpusPage {
    pub filename: &'static str,
    pub url: Option<&'static str>,
}

pub const PAGES: &[CorpusPage] = &[
    CorpusPage {
        filename: "ace.html",
        url: Some("https://www.acehardware.com/departments/tools/power-tools/cordless-drills/2385458"),
    },
    // llbean.html embeds no canonical URL; the file stem keys the product id.
    CorpusPage {
        filename: "llbean.html",
        url: None,
    },
    CorpusPage {
        filename: "nike.html",
        url: Some("https://www.nike.com/t/air-force-1-07-lv8-shoes"),
    },
    CorpusPage {
        filename: "article.html",
        url: Some("https://www.article.com/product/pilar-lamp"),
    },
    CorpusPage {
        filename: "adaysmarch.html",
        url: Some("https://www.adaysmarch.com/products/miller-trousers"),
    },
    CorpusPage {
        filename: "therealreal-gucci-bag.html",
        url: Some("https://www.therealreal.com/products/women/handbags/crossbody-bags/gucci-double-g-marmont-small-tkmwf"),
    },
    CorpusPage {
        filename: "allbirds-shoe.html",
        url: Some("https://www.allbirds.com/products/mens-dasher-nz"),
    },
];
