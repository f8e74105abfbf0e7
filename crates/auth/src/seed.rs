//! Canonical RBAC catalog and the rules that assign permissions to roles.
//!
//! Pure data and matching logic. Running the seed against a store lives in
//! `simplerp-infra::seeder`.

use std::collections::BTreeSet;

/// A catalog permission (inserted only if absent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionSeed {
    pub name: &'static str,
    pub description: &'static str,
    pub module: &'static str,
}

/// How a role picks permissions from the store at seed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentRule {
    /// Every active permission.
    All,
    /// Names ending in the given suffix (e.g. `.view`).
    NameSuffix(&'static str),
    /// Names starting with `m.` or whose module equals `m`.
    Module(&'static str),
    /// One named permission. Missing names are reported, not fatal.
    Exact(&'static str),
}

impl AssignmentRule {
    pub fn matches(&self, name: &str, module: &str) -> bool {
        match self {
            AssignmentRule::All => true,
            AssignmentRule::NameSuffix(suffix) => name.ends_with(suffix),
            AssignmentRule::Module(m) => {
                module == *m
                    || name
                        .strip_prefix(m)
                        .is_some_and(|rest| rest.starts_with('.'))
            }
            AssignmentRule::Exact(exact) => name == *exact,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSeed {
    pub name: &'static str,
    pub description: &'static str,
    pub rules: Vec<AssignmentRule>,
}

/// Outcome of evaluating a role's rules against the permissions present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSelection {
    /// Permission names to link.
    pub names: BTreeSet<String>,
    /// `Exact` rules that matched nothing.
    pub missing: Vec<&'static str>,
}

impl RoleSeed {
    /// Evaluates every rule against `(name, module)` pairs of active permissions.
    pub fn select<'a>(&self, available: impl IntoIterator<Item = (&'a str, &'a str)> + Clone) -> RoleSelection {
        let mut selection = RoleSelection::default();
        for rule in &self.rules {
            let mut hit = false;
            for (name, module) in available.clone() {
                if rule.matches(name, module) {
                    hit = true;
                    selection.names.insert(name.to_string());
                }
            }
            if let AssignmentRule::Exact(name) = rule {
                if !hit {
                    selection.missing.push(name);
                }
            }
        }
        selection
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedCatalog {
    pub roles: Vec<RoleSeed>,
    pub permissions: Vec<PermissionSeed>,
}

pub const ADMIN: &str = "ADMIN";
pub const GESTOR: &str = "GESTOR";
pub const VENDAS: &str = "VENDAS";
pub const ESTOQUE: &str = "ESTOQUE";
pub const FINANCEIRO: &str = "FINANCEIRO";

const fn p(name: &'static str, description: &'static str, module: &'static str) -> PermissionSeed {
    PermissionSeed {
        name,
        description,
        module,
    }
}

const PERMISSIONS: &[PermissionSeed] = &[
    // sales
    p("sales.view", "Visualizar vendas", "sales"),
    p("sales.create", "Criar vendas", "sales"),
    p("sales.edit", "Editar vendas", "sales"),
    p("sales.delete", "Excluir vendas", "sales"),
    p("sales.reports", "Gerar relatórios de vendas", "sales"),
    p("customers.view", "Visualizar clientes", "sales.cadastros"),
    p("payment_plans.view", "Visualizar planos de pagamento", "sales.cadastros"),
    p("orders.view", "Visualizar pedidos de vendas", "sales"),
    // inventory
    p("inventory.view", "Visualizar estoque", "inventory"),
    p("inventory.create", "Adicionar itens ao estoque", "inventory"),
    p("inventory.edit", "Editar itens do estoque", "inventory"),
    p("inventory.delete", "Remover itens do estoque", "inventory"),
    p("inventory.reports", "Gerar relatórios de estoque", "inventory"),
    p("products.view", "Visualizar produtos", "inventory.cadastros"),
    p("supplier_codes.view", "Visualizar códigos por fornecedor", "inventory.cadastros"),
    p("stock_locations.view", "Visualizar locais de estoque", "inventory.cadastros"),
    p("product_location.view", "Visualizar localização de produtos", "inventory.cadastros"),
    p("prices_promotions.view", "Visualizar preços e promoções", "inventory.cadastros"),
    p("taxation.view", "Visualizar tributação", "inventory.cadastros"),
    // finance
    p("finance.view", "Visualizar finanças", "finance"),
    p("finance.create", "Criar transações financeiras", "finance"),
    p("finance.edit", "Editar transações financeiras", "finance"),
    p("finance.delete", "Excluir transações financeiras", "finance"),
    p("finance.reports", "Gerar relatórios financeiros", "finance"),
    p("finance.receive_boleto", "Permissão para receber boleto financeiro", "finance.contas_a_receber"),
    p("finance.view_pendencies", "Visualizar pendências financeiras", "finance.contas_a_receber"),
    // dashboard
    p("dashboard.view_default", "Visualizar o dashboard padrão do perfil", "dashboard"),
    p("dashboard.admin.view", "Visualizar o dashboard do administrador", "dashboard"),
    p("dashboard.sales.view", "Visualizar o dashboard de vendas", "dashboard"),
    p("dashboard.finance.view", "Visualizar o dashboard financeiro", "dashboard"),
    p("dashboard.manager.view", "Visualizar o dashboard gerencial", "dashboard"),
    p("dashboard.inventory.view", "Visualizar o dashboard de estoque", "dashboard"),
    // admin
    p("admin.create_permissions", "Cadastrar novas permissões", "admin"),
    // users
    p("users.view", "Visualizar usuários", "users"),
    p("users.create", "Criar usuários", "users"),
    p("users.edit", "Editar usuários", "users"),
    p("users.delete", "Excluir usuários", "users"),
    // permissions
    p("permissions.view", "Visualizar permissões", "permissions"),
    p("permissions.create", "Criar permissões", "permissions"),
    p("permissions.edit", "Editar permissões", "permissions"),
    p("permissions.delete", "Excluir permissões", "permissions"),
    // roles
    p("roles.view", "Visualizar perfis", "roles"),
    p("roles.create", "Criar perfis", "roles"),
    p("roles.edit", "Editar perfis", "roles"),
    p("roles.delete", "Excluir perfis", "roles"),
];

impl Default for SeedCatalog {
    fn default() -> Self {
        use AssignmentRule::*;

        let roles = vec![
            RoleSeed {
                name: ADMIN,
                description: "Administrador do sistema com acesso completo",
                rules: vec![All],
            },
            RoleSeed {
                name: GESTOR,
                description: "Acesso gerencial a múltiplos módulos",
                rules: vec![
                    NameSuffix(".view"),
                    NameSuffix(".reports"),
                    Exact("dashboard.manager.view"),
                    Exact("dashboard.view_default"),
                ],
            },
            RoleSeed {
                name: VENDAS,
                description: "Acesso ao módulo de vendas",
                rules: vec![
                    Module("sales"),
                    Module("sales.cadastros"),
                    Exact("dashboard.sales.view"),
                    Exact("dashboard.view_default"),
                    Exact("finance.receive_boleto"),
                    Exact("finance.view_pendencies"),
                ],
            },
            RoleSeed {
                name: ESTOQUE,
                description: "Acesso ao módulo de estoque",
                rules: vec![
                    Module("inventory"),
                    Module("inventory.cadastros"),
                    Exact("dashboard.inventory.view"),
                    Exact("dashboard.view_default"),
                ],
            },
            RoleSeed {
                name: FINANCEIRO,
                description: "Acesso ao módulo financeiro",
                rules: vec![
                    Module("finance"),
                    Module("finance.contas_a_receber"),
                    Exact("dashboard.finance.view"),
                    Exact("dashboard.view_default"),
                ],
            },
        ];

        Self {
            roles,
            permissions: PERMISSIONS.to_vec(),
        }
    }
}

impl SeedCatalog {
    pub fn role(&self, name: &str) -> Option<&RoleSeed> {
        self.roles.iter().find(|r| r.name == name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn catalog_pairs(catalog: &SeedCatalog) -> Vec<(&'static str, &'static str)> {
        catalog.permissions.iter().map(|p| (p.name, p.module)).collect()
    }

    #[test]
    fn catalog_names_are_unique() {
        let catalog = SeedCatalog::default();
        let names: BTreeSet<_> = catalog.permissions.iter().map(|p| p.name).collect();
        assert_eq!(names.len(), catalog.permissions.len());
    }

    #[test]
    fn module_rule_matches_prefix_or_module() {
        let rule = AssignmentRule::Module("sales");
        assert!(rule.matches("sales.view", "sales"));
        assert!(rule.matches("orders.view", "sales"));
        assert!(!rule.matches("customers.view", "sales.cadastros"));
        assert!(!rule.matches("salesforce.view", "crm"));
        assert!(!rule.matches("dashboard.sales.view", "dashboard"));
    }

    #[test]
    fn admin_gets_everything() {
        let catalog = SeedCatalog::default();
        let pairs = catalog_pairs(&catalog);
        let sel = catalog.role(ADMIN).unwrap().select(pairs.iter().copied());
        assert_eq!(sel.names.len(), catalog.permissions.len());
    }

    #[test]
    fn vendas_selection_matches_catalog_rules() {
        let catalog = SeedCatalog::default();
        let pairs = catalog_pairs(&catalog);
        let sel = catalog.role(VENDAS).unwrap().select(pairs.iter().copied());
        let expected: BTreeSet<String> = [
            "sales.view",
            "sales.create",
            "sales.edit",
            "sales.delete",
            "sales.reports",
            "orders.view",
            "customers.view",
            "payment_plans.view",
            "dashboard.sales.view",
            "dashboard.view_default",
            "finance.receive_boleto",
            "finance.view_pendencies",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        assert_eq!(sel.names, expected);
        assert!(sel.missing.is_empty());
    }

    #[test]
    fn gestor_gets_views_and_reports_only() {
        let catalog = SeedCatalog::default();
        let pairs = catalog_pairs(&catalog);
        let sel = catalog.role(GESTOR).unwrap().select(pairs.iter().copied());
        assert!(sel.names.contains("inventory.reports"));
        assert!(sel.names.contains("dashboard.view_default"));
        assert!(!sel.names.contains("sales.create"));
        assert!(!sel.names.contains("finance.view_pendencies"));
    }

    #[test]
    fn missing_exact_name_is_reported() {
        let role = RoleSeed {
            name: "X",
            description: "",
            rules: vec![AssignmentRule::Exact("ghost.view")],
        };
        let sel = role.select([("sales.view", "sales")]);
        assert!(sel.names.is_empty());
        assert_eq!(sel.missing, vec!["ghost.view"]);
    }

    proptest! {
        #[test]
        fn module_rule_is_prefix_or_equal(
            m in "[a-z]{2,8}",
            action in "[a-z]{2,8}",
            other in "[a-z]{2,8}",
        ) {
            let rule = AssignmentRule::Module(Box::leak(m.clone().into_boxed_str()));
            let dotted = format!("{m}.{action}");
            prop_assert!(rule.matches(&dotted, &other));
            prop_assert!(rule.matches(&action, &m));
            if other != m {
                let other_dotted = format!("{other}.{action}");
                prop_assert!(!rule.matches(&other_dotted, &other));
            }
        }
    }
}
