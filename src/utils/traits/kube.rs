use kube::ResourceExt;

pub trait LabelExt {
    fn label(&self, key: &str) -> Option<&str>;
}

impl<T: ResourceExt> LabelExt for T {
    fn label(&self, key: &str) -> Option<&str> {
        self.labels().get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Node;
    use kube::api::ObjectMeta;

    #[test]
    fn reads_labels_from_metadata() {
        let node = Node {
            metadata: ObjectMeta {
                name: Some(String::from("cp-0")),
                labels: Some(
                    [(String::from("role"), String::from("control-plane"))]
                        .into_iter()
                        .collect(),
                ),
                ..ObjectMeta::default()
            },
            ..Node::default()
        };

        assert_eq!(node.label("role"), Some("control-plane"));
        assert_eq!(node.label("missing"), None);
    }
}
