//! CycloneDX SBOM 소스
//!
//! 이미 분석된 결과를 담은 문서이므로 트리를 순회하지 않고 블롭으로 바로 변환합니다.
//!
//! # 변환 규칙
//!
//! - `metadata.component`와 `components`(중첩 포함)를 bom-ref로 색인
//! - `operating-system` 컴포넌트는 OS가 됨 (둘 이상이면 에러)
//! - purl이 있는 `library` 컴포넌트를 purl 유형으로 묶음
//!   - `apk`, `deb`, `rpm` -> OS 패키지 하나 (유형이 둘 이상이면 에러)
//!   - 그 외 -> 유형별 애플리케이션 하나 (`cargo`, `npm`, `pypi`, ...)
//! - purl이 없는 컴포넌트는 경고 후 건너뜀
//! - OS 정보가 없으면 OS 패키지는 경고 후 버림
//! - `dependencies`는 패키지의 `depends_on`으로 옮김

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use layerscan_core::types::{
    ARTIFACT_SCHEMA_VERSION, Application, ArtifactInfo, ArtifactType, BlobInfo, Os, Package,
    PackageInfo,
};

use crate::analyzer::AnalysisResult;
use crate::artifact::{ArtifactPlan, ArtifactSource, LayerContent, LayerPlan, PlanContext};
use crate::cache::key::{calc_key, sha256_digest};
use crate::error::InspectorError;

/// 컴포넌트 속성 이름 접두사
const PROPERTY_NAMESPACE: &str = "layerscan:";

const OS_PACKAGE_TYPES: &[&str] = &["apk", "deb", "rpm"];

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Bom {
    #[serde(default)]
    bom_format: String,
    #[serde(default)]
    metadata: Option<BomMetadata>,
    #[serde(default)]
    components: Vec<Component>,
    #[serde(default)]
    dependencies: Vec<Dependency>,
}

#[derive(Deserialize)]
struct BomMetadata {
    #[serde(default)]
    component: Option<Component>,
}

#[derive(Deserialize, Clone)]
struct Component {
    #[serde(default, rename = "bom-ref")]
    bom_ref: String,
    #[serde(default, rename = "type")]
    component_type: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    purl: String,
    #[serde(default)]
    licenses: Vec<LicenseChoice>,
    #[serde(default)]
    properties: Vec<Property>,
    #[serde(default)]
    components: Vec<Component>,
}

#[derive(Deserialize, Clone)]
struct LicenseChoice {
    #[serde(default)]
    expression: Option<String>,
    #[serde(default)]
    license: Option<LicenseRef>,
}

#[derive(Deserialize, Clone)]
struct LicenseRef {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize, Clone)]
struct Property {
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Deserialize)]
struct Dependency {
    #[serde(rename = "ref")]
    dep_ref: String,
    #[serde(default, rename = "dependsOn")]
    depends_on: Vec<String>,
}

/// 파싱된 package URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageUrl {
    pub pkg_type: String,
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub qualifiers: BTreeMap<String, String>,
}

impl PackageUrl {
    /// `pkg:type/namespace/name@version?qualifiers#subpath` 형식을 파싱합니다.
    pub fn parse(purl: &str) -> Result<Self, InspectorError> {
        let invalid =
            |reason: &str| InspectorError::SbomDecode(format!("invalid purl '{purl}': {reason}"));

        let rest = purl
            .strip_prefix("pkg:")
            .ok_or_else(|| invalid("missing 'pkg:' scheme"))?;
        let rest = rest.split_once('#').map_or(rest, |(head, _)| head);
        let (rest, qualifier_str) = match rest.split_once('?') {
            Some((head, q)) => (head, Some(q)),
            None => (rest, None),
        };

        let (pkg_type, path) = rest
            .trim_start_matches('/')
            .split_once('/')
            .ok_or_else(|| invalid("missing package name"))?;
        if pkg_type.is_empty() {
            return Err(invalid("missing package type"));
        }

        let (path, version) = match path.rsplit_once('@') {
            Some((p, v)) => (p, percent_decode(v)),
            None => (path, String::new()),
        };
        let path = path.trim_end_matches('/');
        let (namespace, name) = match path.rsplit_once('/') {
            Some((ns, n)) => (
                ns.split('/').map(percent_decode).collect::<Vec<_>>().join("/"),
                percent_decode(n),
            ),
            None => (String::new(), percent_decode(path)),
        };
        if name.is_empty() {
            return Err(invalid("missing package name"));
        }

        let qualifiers = qualifier_str
            .into_iter()
            .flat_map(|q| q.split('&'))
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.to_ascii_lowercase(), percent_decode(v)))
            .collect();

        Ok(Self {
            pkg_type: pkg_type.to_ascii_lowercase(),
            namespace,
            name,
            version,
            qualifiers,
        })
    }

    pub fn is_os_package(&self) -> bool {
        OS_PACKAGE_TYPES.contains(&self.pkg_type.as_str())
    }

    /// 생태계 관례에 맞는 패키지 이름
    pub fn package_name(&self) -> String {
        if self.namespace.is_empty() || self.is_os_package() {
            return self.name.clone();
        }
        match self.pkg_type.as_str() {
            "maven" => format!("{}:{}", self.namespace, self.name),
            _ => format!("{}/{}", self.namespace, self.name),
        }
    }

    fn to_package(&self) -> Package {
        let name = self.package_name();
        let mut version = self.version.clone();
        let mut release = String::new();
        let mut epoch = 0;

        if self.pkg_type == "rpm" {
            if let Some((v, r)) = self.version.rsplit_once('-') {
                version = v.to_owned();
                release = r.to_owned();
            }
            epoch = self
                .qualifiers
                .get("epoch")
                .and_then(|e| e.parse().ok())
                .unwrap_or(0);
        }

        Package {
            id: Package::make_id(&name, &self.version),
            name,
            version,
            release,
            epoch,
            arch: self.qualifiers.get("arch").cloned().unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// `%XX` 이스케이프를 풉니다. 잘못된 이스케이프는 그대로 둡니다.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(b) = decoded {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// CycloneDX JSON 문서를 블롭으로 변환합니다.
///
/// # Errors
///
/// - JSON이 아니거나 `bomFormat`이 `CycloneDX`가 아니면 `InspectorError::SbomDecode`
/// - OS가 둘 이상이거나 OS 패키지 유형이 둘 이상이면 `InspectorError::SbomDecode`
/// - purl 형식 오류
pub fn decode_cyclonedx(content: &[u8]) -> Result<BlobInfo, InspectorError> {
    let bom: Bom = serde_json::from_slice(content)
        .map_err(|e| InspectorError::SbomDecode(format!("CycloneDX decode error: {e}")))?;
    if bom.bom_format != "CycloneDX" {
        return Err(InspectorError::SbomDecode(format!(
            "unsupported bomFormat '{}'",
            bom.bom_format
        )));
    }

    let mut components = Vec::new();
    if let Some(component) = bom.metadata.and_then(|m| m.component) {
        flatten(component, &mut components);
    }
    for component in bom.components {
        flatten(component, &mut components);
    }

    let mut os: Option<Os> = None;
    let mut os_pkgs: BTreeMap<String, Vec<Package>> = BTreeMap::new();
    let mut lang_pkgs: BTreeMap<String, Vec<Package>> = BTreeMap::new();
    let mut ref_to_id: HashMap<String, String> = HashMap::new();

    for component in &components {
        match component.component_type.as_str() {
            "operating-system" => {
                if os.is_some() {
                    return Err(InspectorError::SbomDecode(
                        "multiple OSes are not supported".to_owned(),
                    ));
                }
                os = Some(Os {
                    family: component.name.clone(),
                    name: component.version.clone(),
                });
            }
            "library" => {
                if component.purl.is_empty() {
                    warn!(bom_ref = %component.bom_ref, "skipping component without purl");
                    continue;
                }
                let purl = PackageUrl::parse(&component.purl)?;
                let package = component_package(component, &purl)?;
                if !component.bom_ref.is_empty() {
                    ref_to_id.insert(component.bom_ref.clone(), package.id.clone());
                }
                let bucket = if purl.is_os_package() {
                    &mut os_pkgs
                } else {
                    &mut lang_pkgs
                };
                bucket.entry(purl.pkg_type).or_default().push(package);
            }
            _ => {}
        }
    }

    if os_pkgs.len() > 1 {
        let types: Vec<&str> = os_pkgs.keys().map(String::as_str).collect();
        return Err(InspectorError::SbomDecode(format!(
            "multiple types of OS packages are not supported ({})",
            types.join(", ")
        )));
    }

    // bom-ref 의존성을 패키지 ID로 변환
    let mut depends: HashMap<String, Vec<String>> = HashMap::new();
    for dep in &bom.dependencies {
        let Some(id) = ref_to_id.get(&dep.dep_ref) else {
            continue;
        };
        let ids: BTreeSet<String> = dep
            .depends_on
            .iter()
            .filter_map(|r| ref_to_id.get(r).cloned())
            .collect();
        depends.insert(id.clone(), ids.into_iter().collect());
    }
    let attach = |mut pkgs: Vec<Package>| -> Vec<Package> {
        for pkg in &mut pkgs {
            if let Some(ids) = depends.get(&pkg.id) {
                pkg.depends_on = ids.clone();
            }
        }
        pkgs
    };

    let mut result = AnalysisResult {
        os: os.clone(),
        ..Default::default()
    };

    if let Some((_, pkgs)) = os_pkgs.into_iter().next() {
        if os.is_some() {
            result.package_infos.push(PackageInfo {
                file_path: String::new(),
                packages: attach(pkgs),
            });
        } else {
            warn!(count = pkgs.len(), "ignoring OS packages as no OS information is found");
        }
    }

    for (pkg_type, pkgs) in lang_pkgs {
        result.applications.push(Application {
            app_type: pkg_type,
            file_path: String::new(),
            libraries: attach(pkgs),
        });
    }

    Ok(result.into_blob())
}

fn flatten(mut component: Component, out: &mut Vec<Component>) {
    let children = std::mem::take(&mut component.components);
    out.push(component);
    for child in children {
        flatten(child, out);
    }
}

fn component_package(component: &Component, purl: &PackageUrl) -> Result<Package, InspectorError> {
    let mut pkg = purl.to_package();

    for license in &component.licenses {
        let name = license.expression.clone().or_else(|| {
            license
                .license
                .as_ref()
                .and_then(|l| l.id.clone().or_else(|| l.name.clone()))
        });
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            pkg.licenses.push(name);
        }
    }

    for prop in &component.properties {
        let Some(key) = prop.name.strip_prefix(PROPERTY_NAMESPACE) else {
            continue;
        };
        match key {
            "PkgID" => pkg.id = prop.value.clone(),
            "SrcName" => pkg.src_name = prop.value.clone(),
            "SrcVersion" => pkg.src_version = prop.value.clone(),
            "SrcRelease" => pkg.src_release = prop.value.clone(),
            "SrcEpoch" => {
                pkg.src_epoch = prop.value.parse().map_err(|e| {
                    InspectorError::SbomDecode(format!("failed to parse source epoch: {e}"))
                })?;
            }
            "LayerDiffID" => pkg.layer.diff_id = prop.value.clone(),
            _ => {}
        }
    }

    if purl.is_os_package() {
        if pkg.src_name.is_empty() {
            pkg.src_name = pkg.name.clone();
        }
        if pkg.src_version.is_empty() {
            pkg.src_version = pkg.version.clone();
        }
        if pkg.src_release.is_empty() {
            pkg.src_release = pkg.release.clone();
        }
        if pkg.src_epoch == 0 {
            pkg.src_epoch = pkg.epoch;
        }
    }

    Ok(pkg)
}

// ─── Source ─────────────────────────────────────────────────────────

/// SBOM 문서 아티팩트
#[derive(Debug)]
pub struct SbomSource {
    path: PathBuf,
    document_digest: String,
    blob: BlobInfo,
}

impl SbomSource {
    /// 문서를 읽고 디코딩합니다.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, InspectorError> {
        let path = path.as_ref().to_path_buf();
        let content = tokio::fs::read(&path)
            .await
            .map_err(|source| InspectorError::Io {
                path: path.display().to_string(),
                source,
            })?;
        let blob = decode_cyclonedx(&content)?;
        Ok(Self {
            document_digest: sha256_digest(&content),
            path,
            blob,
        })
    }

    pub fn blob(&self) -> &BlobInfo {
        &self.blob
    }
}

impl ArtifactSource for SbomSource {
    async fn plan(&self, ctx: &PlanContext) -> Result<ArtifactPlan, InspectorError> {
        // 분석기와 파일 순회를 거치지 않으므로 분석기 버전과 크기 상한은 키에 넣지 않습니다.
        let blob_id = calc_key(
            &self.document_digest,
            &BTreeMap::new(),
            &ctx.skip_files,
            &ctx.skip_dirs,
            None,
        )?;

        Ok(ArtifactPlan {
            artifact_id: blob_id.clone(),
            artifact_type: ArtifactType::Sbom,
            name: self.path.display().to_string(),
            layers: vec![LayerPlan {
                blob_id,
                diff_id: String::new(),
                digest: String::new(),
                created_by: String::new(),
                content: LayerContent::Decoded(Box::new(self.blob.clone())),
            }],
        })
    }

    fn artifact_info(&self, _ctx: &PlanContext) -> Result<ArtifactInfo, InspectorError> {
        Ok(ArtifactInfo {
            schema_version: ARTIFACT_SCHEMA_VERSION,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALPINE_BOM: &str = r#"{
      "bomFormat": "CycloneDX",
      "specVersion": "1.5",
      "version": 1,
      "metadata": {
        "component": {"bom-ref": "root", "type": "container", "name": "alpine:3.11"}
      },
      "components": [
        {"bom-ref": "os", "type": "operating-system", "name": "alpine", "version": "3.11.6"},
        {"bom-ref": "musl", "type": "library", "name": "musl", "version": "1.1.24-r2",
         "purl": "pkg:apk/alpine/musl@1.1.24-r2?arch=x86_64&distro=3.11.6",
         "licenses": [{"expression": "MIT"}]},
        {"bom-ref": "busybox", "type": "library", "name": "busybox", "version": "1.31.1-r9",
         "purl": "pkg:apk/alpine/busybox@1.31.1-r9?arch=x86_64",
         "licenses": [{"license": {"id": "GPL-2.0-only"}}]},
        {"bom-ref": "express", "type": "library", "name": "express", "version": "4.18.2",
         "purl": "pkg:npm/express@4.18.2"},
        {"bom-ref": "babel", "type": "library", "name": "core", "version": "7.22.0",
         "purl": "pkg:npm/%40babel/core@7.22.0"},
        {"bom-ref": "serde", "type": "library", "name": "serde", "version": "1.0.193",
         "purl": "pkg:cargo/serde@1.0.193"},
        {"bom-ref": "nopurl", "type": "library", "name": "mystery", "version": "1.0"}
      ],
      "dependencies": [
        {"ref": "busybox", "dependsOn": ["musl"]},
        {"ref": "express", "dependsOn": ["babel", "unknown"]}
      ]
    }"#;

    #[test]
    fn decodes_os_and_packages() {
        let blob = decode_cyclonedx(ALPINE_BOM.as_bytes()).unwrap();
        assert_eq!(
            blob.os,
            Some(Os {
                family: "alpine".to_owned(),
                name: "3.11.6".to_owned(),
            })
        );

        assert_eq!(blob.package_infos.len(), 1);
        let pkgs = &blob.package_infos[0].packages;
        let ids: Vec<_> = pkgs.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["busybox@1.31.1-r9", "musl@1.1.24-r2"]);

        let musl = &pkgs[1];
        assert_eq!(musl.arch, "x86_64");
        assert_eq!(musl.src_name, "musl");
        assert_eq!(musl.src_version, "1.1.24-r2");
        assert_eq!(musl.licenses, vec!["MIT"]);
        assert_eq!(pkgs[0].licenses, vec!["GPL-2.0-only"]);
        assert_eq!(pkgs[0].depends_on, vec!["musl@1.1.24-r2"]);
    }

    #[test]
    fn groups_language_packages_by_purl_type() {
        let blob = decode_cyclonedx(ALPINE_BOM.as_bytes()).unwrap();
        let types: Vec<_> = blob.applications.iter().map(|a| a.app_type.as_str()).collect();
        assert_eq!(types, vec!["cargo", "npm"]);

        let npm = &blob.applications[1];
        let names: Vec<_> = npm.libraries.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["@babel/core", "express"]);
        assert_eq!(npm.libraries[1].depends_on, vec!["@babel/core@7.22.0"]);
    }

    #[test]
    fn multiple_os_is_error() {
        let doc = r#"{"bomFormat": "CycloneDX", "components": [
            {"type": "operating-system", "name": "alpine", "version": "3.11"},
            {"type": "operating-system", "name": "debian", "version": "10"}
        ]}"#;
        let err = decode_cyclonedx(doc.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("multiple OSes"));
    }

    #[test]
    fn mixed_os_package_types_is_error() {
        let doc = r#"{"bomFormat": "CycloneDX", "components": [
            {"type": "operating-system", "name": "alpine", "version": "3.11"},
            {"type": "library", "purl": "pkg:apk/alpine/musl@1.1.24-r2"},
            {"type": "library", "purl": "pkg:deb/debian/libc6@2.31-13"}
        ]}"#;
        let err = decode_cyclonedx(doc.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("multiple types of OS packages"));
    }

    #[test]
    fn os_packages_without_os_are_dropped() {
        let doc = r#"{"bomFormat": "CycloneDX", "components": [
            {"type": "library", "purl": "pkg:apk/alpine/musl@1.1.24-r2"},
            {"type": "library", "purl": "pkg:pypi/flask@2.3.2"}
        ]}"#;
        let blob = decode_cyclonedx(doc.as_bytes()).unwrap();
        assert!(blob.os.is_none());
        assert!(blob.package_infos.is_empty());
        assert_eq!(blob.applications[0].app_type, "pypi");
    }

    #[test]
    fn rejects_non_cyclonedx() {
        let err = decode_cyclonedx(br#"{"spdxVersion": "SPDX-2.3"}"#).unwrap_err();
        assert!(err.to_string().contains("unsupported bomFormat"));
        assert!(decode_cyclonedx(b"not json").is_err());
    }

    #[test]
    fn parses_purl_forms() {
        let p = PackageUrl::parse("pkg:maven/org.apache.logging.log4j/log4j-core@2.17.0").unwrap();
        assert_eq!(p.package_name(), "org.apache.logging.log4j:log4j-core");

        let p =
            PackageUrl::parse("pkg:rpm/redhat/openssl@1.1.1k-7.el8?arch=x86_64&epoch=1").unwrap();
        let pkg = p.to_package();
        assert_eq!(pkg.version, "1.1.1k");
        assert_eq!(pkg.release, "7.el8");
        assert_eq!(pkg.epoch, 1);
        assert_eq!(pkg.id, "openssl@1.1.1k-7.el8");

        assert!(PackageUrl::parse("npm/express@1").is_err());
        assert!(PackageUrl::parse("pkg:npm").is_err());
    }

    #[test]
    fn percent_decoding() {
        assert_eq!(percent_decode("%40babel"), "@babel");
        assert_eq!(percent_decode("a%2"), "a%2");
        assert_eq!(percent_decode("plain"), "plain");
    }

    #[tokio::test]
    async fn source_plan_is_single_decoded_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bom.json");
        std::fs::write(&path, ALPINE_BOM).unwrap();

        let source = SbomSource::open(&path).await.unwrap();
        let ctx = PlanContext {
            analyzer_versions: BTreeMap::from([("apk".to_owned(), 1)]),
            skip_files: Vec::new(),
            skip_dirs: Vec::new(),
            max_file_size: 10 * 1024 * 1024,
        };
        let plan = source.plan(&ctx).await.unwrap();
        assert_eq!(plan.artifact_type, ArtifactType::Sbom);
        assert_eq!(plan.artifact_id, plan.layers[0].blob_id);
        assert!(matches!(plan.layers[0].content, LayerContent::Decoded(_)));

        // 분석기 버전은 SBOM 키에 영향이 없음
        let other = PlanContext {
            analyzer_versions: BTreeMap::new(),
            ..ctx
        };
        assert_eq!(source.plan(&other).await.unwrap().artifact_id, plan.artifact_id);
    }
}
