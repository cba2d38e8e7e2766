//! Row-level access policies
//!
//! A `PolicySet` is the single description of who may read and write which
//! rows. It is rendered into `CREATE POLICY` statements by the store's
//! migrations and evaluated in-process to pre-check operations.
//!
//! Manager checks go through the `manager_ids` view instead of joining
//! `profiles` and `roles` from inside their own policies. The view is a live
//! (non-materialized) view owned by the schema owner, so it is recomputed on
//! every query and is not itself subject to row-level security. Predicates
//! that read protected tables directly are still expressible (`HasRole`), and
//! `PolicySet::validate` rejects any set where such reads form a cycle.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use uuid::Uuid;

use crate::error::{CustodyError, Result};
use crate::model::{CashCustody, ManagerPrices, Notification, Profile, Role, RoleName, Wallet};

/// SQL expression returning the acting user's id (NULL when anonymous)
pub const CURRENT_USER_SQL: &str = "app_current_user_id()";

/// View listing the user ids holding the manager role
pub const MANAGER_IDS_VIEW: &str = "manager_ids";

/// View listing `(user_id, role_name)` for every profile with a role
pub const USER_ROLES_VIEW: &str = "user_roles";

/// Tables protected by row-level security
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PolicyTable {
    Profiles,
    Roles,
    CashCustody,
    Notifications,
    Wallets,
    ManagerPrices,
}

impl PolicyTable {
    pub const ALL: [PolicyTable; 6] = [
        PolicyTable::Profiles,
        PolicyTable::Roles,
        PolicyTable::CashCustody,
        PolicyTable::Notifications,
        PolicyTable::Wallets,
        PolicyTable::ManagerPrices,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Roles => "roles",
            Self::CashCustody => "cash_custody",
            Self::Notifications => "notifications",
            Self::Wallets => "wallets",
            Self::ManagerPrices => "manager_prices",
        }
    }
}

impl fmt::Display for PolicyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Command {
    Select,
    Insert,
    Update,
    Delete,
}

impl Command {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// Boolean condition evaluated per row for the acting user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Any identified user
    Authenticated,
    /// Acting user is listed in `manager_ids`
    IsManager,
    /// Acting user holds the role, looked up through `user_roles`
    ActsAs(RoleName),
    /// Acting user holds the role, looked up by joining `profiles` and `roles`
    /// directly. Creates a dependency on both tables.
    HasRole(RoleName),
    /// The row's uuid column equals the acting user
    ColumnIsCurrentUser(&'static str),
    /// The row's text column equals a fixed value
    ColumnEquals(&'static str, &'static str),
    Any(Vec<Predicate>),
    All(Vec<Predicate>),
}

impl Predicate {
    pub fn any(clauses: impl IntoIterator<Item = Predicate>) -> Self {
        Self::Any(clauses.into_iter().collect())
    }

    pub fn all(clauses: impl IntoIterator<Item = Predicate>) -> Self {
        Self::All(clauses.into_iter().collect())
    }

    /// Protected tables read while evaluating this predicate.
    ///
    /// Views are not listed: they run with the owner's rights and bypass
    /// row-level security.
    pub fn reads(&self) -> BTreeSet<PolicyTable> {
        let mut tables = BTreeSet::new();
        self.collect_reads(&mut tables);
        tables
    }

    fn collect_reads(&self, tables: &mut BTreeSet<PolicyTable>) {
        match self {
            Self::HasRole(_) => {
                tables.insert(PolicyTable::Profiles);
                tables.insert(PolicyTable::Roles);
            }
            Self::Any(clauses) | Self::All(clauses) => {
                for clause in clauses {
                    clause.collect_reads(tables);
                }
            }
            Self::Authenticated
            | Self::IsManager
            | Self::ActsAs(_)
            | Self::ColumnIsCurrentUser(_)
            | Self::ColumnEquals(..) => {}
        }
    }

    /// Render as a SQL boolean expression.
    pub fn to_sql(&self) -> String {
        match self {
            Self::Authenticated => format!("{CURRENT_USER_SQL} IS NOT NULL"),
            Self::IsManager => {
                format!("{CURRENT_USER_SQL} IN (SELECT user_id FROM {MANAGER_IDS_VIEW})")
            }
            Self::ActsAs(role) => format!(
                "EXISTS (SELECT 1 FROM {USER_ROLES_VIEW} ur WHERE ur.user_id = {CURRENT_USER_SQL} AND ur.role_name = '{}')",
                role.as_str()
            ),
            Self::HasRole(role) => format!(
                "EXISTS (SELECT 1 FROM profiles p JOIN roles r ON r.id = p.role_id WHERE p.id = {CURRENT_USER_SQL} AND r.name = '{}')",
                role.as_str()
            ),
            Self::ColumnIsCurrentUser(column) => format!("{column} = {CURRENT_USER_SQL}"),
            Self::ColumnEquals(column, value) => {
                format!("{column} = '{}'", value.replace('\'', "''"))
            }
            Self::Any(clauses) => join_sql(clauses, " OR ", "false"),
            Self::All(clauses) => join_sql(clauses, " AND ", "true"),
        }
    }

    /// Evaluate against `actor` and `row`.
    pub fn evaluate(&self, actor: &Actor, row: &dyn PolicyRow) -> bool {
        match self {
            Self::Authenticated => true,
            Self::IsManager => actor.is_manager,
            Self::ActsAs(role) | Self::HasRole(role) => actor.role == Some(*role),
            Self::ColumnIsCurrentUser(column) => row.uuid_column(column) == Some(actor.user_id),
            Self::ColumnEquals(column, value) => row.text_column(column).as_deref() == Some(*value),
            Self::Any(clauses) => clauses.iter().any(|c| c.evaluate(actor, row)),
            Self::All(clauses) => clauses.iter().all(|c| c.evaluate(actor, row)),
        }
    }
}

fn join_sql(clauses: &[Predicate], separator: &str, empty: &str) -> String {
    if clauses.is_empty() {
        return empty.to_owned();
    }
    let parts: Vec<String> = clauses.iter().map(|c| format!("({})", c.to_sql())).collect();
    parts.join(separator)
}

/// Column access used by in-process evaluation
pub trait PolicyRow {
    fn uuid_column(&self, _column: &str) -> Option<Uuid> {
        None
    }

    fn text_column(&self, _column: &str) -> Option<String> {
        None
    }
}

impl PolicyRow for CashCustody {
    fn uuid_column(&self, column: &str) -> Option<Uuid> {
        match column {
            "id" => Some(self.id),
            "treasurer_id" => Some(self.treasurer_id),
            "cashier_id" => Some(self.cashier_id),
            "wallet_id" => Some(self.wallet_id),
            "original_custody_id" => self.original_custody_id,
            _ => None,
        }
    }

    fn text_column(&self, column: &str) -> Option<String> {
        match column {
            "status" => Some(self.status.as_str().to_owned()),
            "currency" => Some(self.currency.as_str().to_owned()),
            _ => None,
        }
    }
}

impl PolicyRow for Notification {
    fn uuid_column(&self, column: &str) -> Option<Uuid> {
        match column {
            "id" => Some(self.id),
            "user_id" => Some(self.user_id),
            "related_id" => self.related_id,
            _ => None,
        }
    }

    fn text_column(&self, column: &str) -> Option<String> {
        (column == "type").then(|| self.kind.as_str().to_owned())
    }
}

impl PolicyRow for Profile {
    fn uuid_column(&self, column: &str) -> Option<Uuid> {
        match column {
            "id" => Some(self.id),
            "role_id" => self.role_id,
            _ => None,
        }
    }
}

impl PolicyRow for Role {}
impl PolicyRow for Wallet {}
impl PolicyRow for ManagerPrices {}

/// A row with no readable columns, for table-level checks
pub struct NoRow;

impl PolicyRow for NoRow {}

/// Set of user ids holding the manager role, computed the way the
/// `manager_ids` view computes it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagerIds(HashSet<Uuid>);

impl ManagerIds {
    /// Recompute from the current profiles and roles. Never cached.
    pub fn resolve(profiles: &[Profile], roles: &[Role]) -> Self {
        let manager_roles: HashSet<Uuid> = roles
            .iter()
            .filter(|role| role.name == RoleName::Manager)
            .map(|role| role.id)
            .collect();
        Self(
            profiles
                .iter()
                .filter(|p| p.role_id.is_some_and(|id| manager_roles.contains(&id)))
                .map(|p| p.id)
                .collect(),
        )
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.0.contains(&user_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Uuid> for ManagerIds {
    fn from_iter<I: IntoIterator<Item = Uuid>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The acting user as seen by policies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Option<RoleName>,
    pub is_manager: bool,
}

impl Actor {
    /// Look the user up in `profiles`/`roles`.
    pub fn resolve(user_id: Uuid, profiles: &[Profile], roles: &[Role]) -> Self {
        let role = profiles
            .iter()
            .find(|p| p.id == user_id)
            .and_then(|p| p.role_id)
            .and_then(|role_id| roles.iter().find(|r| r.id == role_id))
            .map(|r| r.name);
        Self {
            user_id,
            role,
            is_manager: ManagerIds::resolve(profiles, roles).contains(user_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePolicy {
    pub table: PolicyTable,
    pub command: Command,
    pub predicate: Predicate,
}

impl TablePolicy {
    pub fn name(&self) -> String {
        format!("{}_{}", self.table.as_str(), self.command)
    }

    /// `DROP POLICY IF EXISTS` + `CREATE POLICY` for this entry.
    pub fn to_sql(&self) -> [String; 2] {
        let predicate = self.predicate.to_sql();
        let clauses = match self.command {
            Command::Select | Command::Delete => format!("USING ({predicate})"),
            Command::Insert => format!("WITH CHECK ({predicate})"),
            Command::Update => format!("USING ({predicate}) WITH CHECK ({predicate})"),
        };
        [
            format!(
                "DROP POLICY IF EXISTS {} ON {}",
                self.name(),
                self.table.as_str()
            ),
            format!(
                "CREATE POLICY {} ON {} FOR {} {}",
                self.name(),
                self.table.as_str(),
                self.command.as_sql(),
                clauses
            ),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PolicySet {
    policies: Vec<TablePolicy>,
}

impl PolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, table: PolicyTable, command: Command, predicate: Predicate) -> Self {
        self.policies.push(TablePolicy {
            table,
            command,
            predicate,
        });
        self
    }

    pub fn policies(&self) -> &[TablePolicy] {
        &self.policies
    }

    /// The policies installed by `migrate policies`.
    pub fn standard() -> Self {
        use Command::*;
        use PolicyTable::{ManagerPrices, Notifications, Profiles, Roles, Wallets};
        use Predicate::*;
        let custody = PolicyTable::CashCustody;

        let custody_party = || {
            Predicate::any([
                IsManager,
                ColumnIsCurrentUser("treasurer_id"),
                ColumnIsCurrentUser("cashier_id"),
            ])
        };
        let own_or_manager =
            |column: &'static str| Predicate::any([ColumnIsCurrentUser(column), IsManager]);

        Self::new()
            .with(Profiles, Select, Authenticated)
            .with(Profiles, Insert, own_or_manager("id"))
            .with(Profiles, Update, own_or_manager("id"))
            .with(Profiles, Delete, IsManager)
            .with(Roles, Select, Authenticated)
            .with(Roles, Insert, IsManager)
            .with(Roles, Update, IsManager)
            .with(Roles, Delete, IsManager)
            .with(custody, Select, custody_party())
            .with(
                custody,
                Insert,
                Predicate::any([
                    IsManager,
                    Predicate::all([
                        ActsAs(RoleName::Treasurer),
                        ColumnIsCurrentUser("treasurer_id"),
                    ]),
                    Predicate::all([
                        ActsAs(RoleName::Cashier),
                        ColumnIsCurrentUser("cashier_id"),
                        ColumnEquals("status", "returned"),
                    ]),
                ]),
            )
            .with(custody, Update, custody_party())
            .with(custody, Delete, IsManager)
            .with(Notifications, Select, own_or_manager("user_id"))
            .with(Notifications, Insert, Authenticated)
            .with(Notifications, Update, own_or_manager("user_id"))
            .with(Notifications, Delete, own_or_manager("user_id"))
            .with(Wallets, Select, Authenticated)
            .with(Wallets, Insert, IsManager)
            .with(Wallets, Update, IsManager)
            .with(Wallets, Delete, IsManager)
            .with(ManagerPrices, Select, Authenticated)
            .with(ManagerPrices, Insert, IsManager)
            .with(ManagerPrices, Update, IsManager)
    }

    /// Reject sets whose predicates read protected tables in a cycle.
    pub fn validate(&self) -> Result<()> {
        let mut edges: BTreeMap<PolicyTable, BTreeSet<PolicyTable>> = BTreeMap::new();
        for policy in &self.policies {
            edges
                .entry(policy.table)
                .or_default()
                .extend(policy.predicate.reads());
        }

        let mut finished = BTreeSet::new();
        for start in edges.keys().copied() {
            let mut path = Vec::new();
            if let Some(cycle) = find_cycle(start, &edges, &mut path, &mut finished) {
                return Err(CustodyError::PolicyCycle { path: cycle });
            }
        }
        Ok(())
    }

    /// Whether any permissive policy for `table`/`command` admits the row.
    /// No matching policy means denied, as with row-level security.
    pub fn allows(
        &self,
        actor: &Actor,
        table: PolicyTable,
        command: Command,
        row: &dyn PolicyRow,
    ) -> bool {
        self.policies
            .iter()
            .filter(|p| p.table == table && p.command == command)
            .any(|p| p.predicate.evaluate(actor, row))
    }

    pub fn check(
        &self,
        actor: &Actor,
        table: PolicyTable,
        command: Command,
        row: &dyn PolicyRow,
    ) -> Result<()> {
        if self.allows(actor, table, command, row) {
            Ok(())
        } else {
            tracing::debug!(user = %actor.user_id, %table, %command, "policy denied");
            Err(CustodyError::Unauthorized { command, table })
        }
    }

    /// Every statement needed to (re)install the set, per table:
    /// enable row-level security, then drop and create each policy.
    pub fn to_sql(&self) -> Vec<String> {
        let tables: BTreeSet<PolicyTable> = self.policies.iter().map(|p| p.table).collect();
        let mut statements: Vec<String> = tables
            .iter()
            .map(|t| format!("ALTER TABLE {} ENABLE ROW LEVEL SECURITY", t.as_str()))
            .collect();
        for policy in &self.policies {
            statements.extend(policy.to_sql());
        }
        statements
    }
}

fn find_cycle(
    node: PolicyTable,
    edges: &BTreeMap<PolicyTable, BTreeSet<PolicyTable>>,
    path: &mut Vec<PolicyTable>,
    finished: &mut BTreeSet<PolicyTable>,
) -> Option<Vec<PolicyTable>> {
    if let Some(pos) = path.iter().position(|t| *t == node) {
        let mut cycle = path[pos..].to_vec();
        cycle.push(node);
        return Some(cycle);
    }
    if finished.contains(&node) {
        return None;
    }

    path.push(node);
    if let Some(next) = edges.get(&node) {
        for &dep in next {
            if let Some(cycle) = find_cycle(dep, edges, path, finished) {
                return Some(cycle);
            }
        }
    }
    path.pop();
    finished.insert(node);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Currency, CustodyStatus};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn roles() -> Vec<Role> {
        RoleName::ALL
            .into_iter()
            .map(|name| Role {
                id: Uuid::new_v4(),
                name,
                description: name.description().to_owned(),
            })
            .collect()
    }

    fn profile(role: Option<&Role>) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            full_name: "Test User".into(),
            email: "user@example.com".into(),
            role_id: role.map(|r| r.id),
        }
    }

    fn custody(treasurer: Uuid, cashier: Uuid, status: CustodyStatus) -> CashCustody {
        CashCustody {
            id: Uuid::new_v4(),
            treasurer_id: treasurer,
            cashier_id: cashier,
            wallet_id: Uuid::new_v4(),
            currency: Currency::parse("USD").unwrap(),
            amount: Decimal::new(500, 0),
            notes: String::new(),
            status,
            is_returned: false,
            original_custody_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn standard_set_has_no_cycles() {
        PolicySet::standard().validate().unwrap();
    }

    #[test]
    fn direct_role_lookup_on_profiles_is_a_cycle() {
        let set = PolicySet::new().with(
            PolicyTable::Profiles,
            Command::Select,
            Predicate::HasRole(RoleName::Manager),
        );
        match set.validate() {
            Err(CustodyError::PolicyCycle { path }) => {
                assert_eq!(path.first(), path.last());
                assert!(path.contains(&PolicyTable::Profiles));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn indirect_cycle_is_found() {
        // roles policy reads profiles, profiles policy reads roles
        let set = PolicySet::new()
            .with(
                PolicyTable::CashCustody,
                Command::Select,
                Predicate::HasRole(RoleName::Treasurer),
            )
            .with(
                PolicyTable::Roles,
                Command::Update,
                Predicate::HasRole(RoleName::Manager),
            );
        assert!(matches!(
            set.validate(),
            Err(CustodyError::PolicyCycle { .. })
        ));
    }

    #[test]
    fn role_lookup_from_unrelated_table_is_fine() {
        let set = PolicySet::new()
            .with(
                PolicyTable::CashCustody,
                Command::Select,
                Predicate::HasRole(RoleName::Treasurer),
            )
            .with(PolicyTable::Profiles, Command::Select, Predicate::IsManager);
        set.validate().unwrap();
    }

    #[test]
    fn manager_ids_only_contain_managers() {
        let roles = roles();
        let profiles: Vec<Profile> = roles
            .iter()
            .map(|r| profile(Some(r)))
            .chain(std::iter::once(profile(None)))
            .collect();

        let managers = ManagerIds::resolve(&profiles, &roles);
        assert_eq!(managers.len(), 1);
        assert!(managers.contains(profiles[0].id));
        for p in &profiles[1..] {
            assert!(!managers.contains(p.id));
        }
    }

    #[test]
    fn custody_visible_only_to_parties_and_managers() {
        let roles = roles();
        let manager = profile(Some(&roles[0]));
        let treasurer = profile(Some(&roles[1]));
        let cashier = profile(Some(&roles[2]));
        let outsider = profile(Some(&roles[2]));
        let profiles = vec![
            manager.clone(),
            treasurer.clone(),
            cashier.clone(),
            outsider.clone(),
        ];
        let record = custody(treasurer.id, cashier.id, CustodyStatus::Pending);
        let set = PolicySet::standard();

        for (who, expected) in [
            (&manager, true),
            (&treasurer, true),
            (&cashier, true),
            (&outsider, false),
        ] {
            let actor = Actor::resolve(who.id, &profiles, &roles);
            assert_eq!(
                set.allows(&actor, PolicyTable::CashCustody, Command::Select, &record),
                expected,
                "{:?}",
                actor.role
            );
        }
    }

    #[test]
    fn cashier_may_only_insert_return_records() {
        let roles = roles();
        let treasurer = profile(Some(&roles[1]));
        let cashier = profile(Some(&roles[2]));
        let profiles = vec![treasurer.clone(), cashier.clone()];
        let actor = Actor::resolve(cashier.id, &profiles, &roles);
        let set = PolicySet::standard();

        let pending = custody(treasurer.id, cashier.id, CustodyStatus::Pending);
        assert!(set
            .check(&actor, PolicyTable::CashCustody, Command::Insert, &pending)
            .is_err());

        let returned = custody(treasurer.id, cashier.id, CustodyStatus::Returned);
        assert!(set
            .check(&actor, PolicyTable::CashCustody, Command::Insert, &returned)
            .is_ok());
    }

    #[test]
    fn missing_policy_denies() {
        let roles = roles();
        let manager = profile(Some(&roles[0]));
        let actor = Actor::resolve(manager.id, &[manager.clone()], &roles);
        assert!(actor.is_manager);
        assert!(!PolicySet::new().allows(
            &actor,
            PolicyTable::Wallets,
            Command::Select,
            &NoRow
        ));
    }

    #[test]
    fn manager_predicate_renders_against_view() {
        let sql = Predicate::IsManager.to_sql();
        assert_eq!(
            sql,
            "app_current_user_id() IN (SELECT user_id FROM manager_ids)"
        );
        assert!(!sql.contains("profiles"));
    }

    #[test]
    fn policy_sql_uses_check_for_inserts() {
        let policy = TablePolicy {
            table: PolicyTable::Notifications,
            command: Command::Insert,
            predicate: Predicate::Authenticated,
        };
        let [drop, create] = policy.to_sql();
        assert_eq!(
            drop,
            "DROP POLICY IF EXISTS notifications_insert ON notifications"
        );
        assert_eq!(
            create,
            "CREATE POLICY notifications_insert ON notifications FOR INSERT WITH CHECK (app_current_user_id() IS NOT NULL)"
        );
    }

    #[test]
    fn column_equals_escapes_quotes() {
        assert_eq!(
            Predicate::ColumnEquals("notes", "o'clock").to_sql(),
            "notes = 'o''clock'"
        );
    }

    #[test]
    fn standard_sql_enables_rls_first() {
        let statements = PolicySet::standard().to_sql();
        let enables = statements
            .iter()
            .take_while(|s| s.contains("ENABLE ROW LEVEL SECURITY"))
            .count();
        assert_eq!(enables, PolicyTable::ALL.len());
    }
}
