use criterion::{Criterion, criterion_group, criterion_main};
use fakebuild::config::{BuildConfig, FakeConfig};
use fakebuild::maven::descriptor::parse_descriptor_str;
use fakebuild::maven::{ProfileActivation, VersionRange, compare_versions};
use fakebuild::rules::{GlobPattern, parse_rules};
use std::hint::black_box;
use std::path::Path;

const MOCK_CONFIG: &str = r#"
[build]
parallel = 8
compiler = "javac"

[resolver]
offline = true
repositories = ["https://repo1.maven.org/maven2/"]
"#;

const MOCK_RULES: &str = r#"
JAVAVERSION=1.5
all <- ij.jar plugins/Foo.jar plugins/Bar.jar
CLASSPATH(plugins/Foo.jar)=ij.jar
ij.jar[true] <-
plugins/Foo.jar[true] <- ij.jar
plugins/Bar.jar[true] <- plugins/Foo.jar
"#;

const MOCK_POM: &str = r#"
<project>
  <groupId>org.example</groupId>
  <artifactId>app</artifactId>
  <version>1.0.0-SNAPSHOT</version>
  <properties><junit.version>4.8.1</junit.version></properties>
  <dependencies>
    <dependency>
      <groupId>junit</groupId><artifactId>junit</artifactId>
      <version>${junit.version}</version><scope>test</scope>
    </dependency>
    <dependency>
      <groupId>org.example</groupId><artifactId>core</artifactId><version>[1.0,2.0)</version>
    </dependency>
  </dependencies>
  <profiles>
    <profile><id>javac</id><dependencies>
      <dependency><groupId>com.sun</groupId><artifactId>tools</artifactId><version>1.4.2</version></dependency>
    </dependencies></profile>
  </profiles>
</project>
"#;

fn bench_config_parse(c: &mut Criterion) {
    c.bench_function("parse_fake_toml", |b| {
        b.iter(|| FakeConfig::parse(black_box(MOCK_CONFIG)).unwrap())
    });
}

fn bench_rules_parse(c: &mut Criterion) {
    let build = BuildConfig::default();
    let cwd = std::env::temp_dir();
    c.bench_function("parse_fakefile", |b| {
        b.iter(|| parse_rules(black_box(MOCK_RULES), "Fakefile", &cwd, &[], &build).unwrap())
    });
}

fn bench_descriptor_parse(c: &mut Criterion) {
    let activation = ProfileActivation::default();
    c.bench_function("parse_pom_xml", |b| {
        b.iter(|| {
            parse_descriptor_str(black_box(MOCK_POM), "pom.xml", Path::new("."), &activation).unwrap()
        })
    });
}

fn bench_versions(c: &mut Criterion) {
    c.bench_function("compare_versions", |b| {
        b.iter(|| {
            let _ = compare_versions(black_box("1.10.2"), black_box("1.9.12"));
            let _ = compare_versions(black_box("2.0-SNAPSHOT"), black_box("2.0"));
            let _ = compare_versions(black_box("1.4.2_03"), black_box("1.4.2"));
        })
    });

    let range = VersionRange::parse("[1.0,2.0)").unwrap();
    let candidates = ["0.9", "1.0", "1.5.3", "1.10", "2.0", "2.1"];
    c.bench_function("version_range_select", |b| {
        b.iter(|| range.select(black_box(candidates.iter().copied())))
    });
}

fn bench_glob(c: &mut Criterion) {
    let pattern = GlobPattern::new("src-plugins/*/**/*.java").unwrap();
    c.bench_function("glob_matches", |b| {
        b.iter(|| {
            let _ = pattern.matches(black_box("src-plugins/Foo/ij/plugin/Foo.java"));
            let _ = pattern.matches(black_box("src-plugins/Foo/README.txt"));
        })
    });
}

criterion_group!(
    benches,
    bench_config_parse,
    bench_rules_parse,
    bench_descriptor_parse,
    bench_versions,
    bench_glob
);
criterion_main!(benches);
