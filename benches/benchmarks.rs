use criterion::{black_box, criterion_group, criterion_main, Criterion};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;
use theme_import::css_parser::scan_references;
use theme_import::{
    CssParser, Fetch, FetchError, FileDownloader, FileManager, ImportLog, ImportSettings,
    UrlConverter,
};
use tokio::runtime::Runtime;

const STYLESHEET: &str = r#"
    @import url("reset.css");
    @import 'print.css' print;
    .bg1 { background-image: url('/images/bg1.jpg'); }
    .bg2 { background: url(../images/bg2.jpg) no-repeat; }
    .bg3 { background-image: url("images/bg3.jpg"); }
    .bg4 { background: url(https://cdn.example.net/bg4.jpg); }
    .bg5 { background: url(data:image/gif;base64,R0lGODlhAQABAAAAACw=); }
    .bg6 { background-color: red; }
    @font-face { font-family: x; src: url(fonts/x.woff2) format("woff2"); }
"#;

struct Offline;

impl Fetch for Offline {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FetchError>> {
        let status = FetchError::Status {
            url: url.to_string(),
            status: 404,
        };
        async move { Err(status) }.boxed()
    }
}

fn settings(theme_root: &Path) -> ImportSettings {
    ImportSettings::new(
        "https://example.com/site/index.html",
        "mysite",
        theme_root,
        "/web_resources/themes/mysite",
    )
}

fn bench_reference_scanning(c: &mut Criterion) {
    c.bench_function("scan_css_references", |b| {
        b.iter(|| {
            let _refs = scan_references(black_box(STYLESHEET));
        });
    });
}

fn bench_url_resolution(c: &mut Criterion) {
    let converter = UrlConverter::new(&settings(Path::new("/theme")), ImportLog::new()).unwrap();
    let test_urls = vec![
        "../style.css",
        "./script.js",
        "images/photo.jpg",
        "https://cdn.example.com/style.css",
        "//cdn.example.com/script.js",
        "../../../assets/logo.png",
        "./nested/path/file.css",
    ];

    c.bench_function("resolve_urls", |b| {
        b.iter(|| {
            for url in &test_urls {
                let _resolved = converter.full_url(black_box(url));
            }
        });
    });
}

fn bench_theme_paths(c: &mut Criterion) {
    let converter = UrlConverter::new(&settings(Path::new("/theme")), ImportLog::new()).unwrap();
    let test_urls = vec![
        "https://example.com/css/main.css",
        "https://example.com:8080/img/a%2Fb.png",
        "https://example.com/path/with spaces/",
        "https://example.com/script.js?v=1.2.3",
        "https://example.com/a/../b/./c.gif",
    ];

    c.bench_function("theme_paths", |b| {
        b.iter(|| {
            for url in &test_urls {
                let _path = converter.file_system_path(black_box(url));
                let _link = converter.convert_to_theme_link(black_box(url));
                let _asset = converter.cms_folder_path_for_image_asset(black_box(url), "mysite");
            }
        });
    });
}

fn bench_inline_css_rewrite(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let temp_dir = tempdir().unwrap();
    let log = ImportLog::new();
    let converter = Arc::new(UrlConverter::new(&settings(temp_dir.path()), log.clone()).unwrap());
    let downloader = FileDownloader::new(Arc::new(Offline), temp_dir.path(), 4);

    c.bench_function("rewrite_inline_css", |b| {
        b.iter(|| {
            let mut parser = CssParser::new(converter.clone(), downloader.clone(), ImportLog::new());
            runtime.block_on(async {
                let _rewrite = parser
                    .parse_inline("https://example.com/site/css/main.css", black_box(STYLESHEET))
                    .await;
            });
        });
    });
}

fn bench_file_saving(c: &mut Criterion) {
    let temp_dir = tempdir().unwrap();
    let file_manager = FileManager::new(temp_dir.path());
    let test_files = vec![
        ("import/example.com/style.css", b"body { color: red; }".as_slice()),
        ("import/example.com/js/app.js", b"console.log(1);".as_slice()),
        ("import/cdn.example.net/fonts/x.woff2", b"wOF2".as_slice()),
    ];

    c.bench_function("save_theme_files", |b| {
        b.iter(|| {
            for (path, content) in &test_files {
                let _result =
                    file_manager.save_file(&temp_dir.path().join(path), black_box(content));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_reference_scanning,
    bench_url_resolution,
    bench_theme_paths,
    bench_inline_css_rewrite,
    bench_file_saving,
);
criterion_main!(benches);
